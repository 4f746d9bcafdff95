use std::sync::Arc;
use std::time::Duration;

use batchflow::samples::{sample_factory, sample_jobs};
use batchflow::{BatchStatus, JobOperator, Properties, CONFIG};
use parking_lot::Mutex;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // RUST_LOG manda; por defecto info. Los `log::` del core llegan vía tracing-log.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn usage() -> ! {
    eprintln!("uso: batch-cli jobs | batch-cli run <job> [--events] [clave=valor ...]");
    std::process::exit(2);
}

fn build_operator(sink: Arc<Mutex<Vec<Value>>>) -> JobOperator {
    let op = match JobOperator::builder(Arc::new(sample_factory(sink))).config(CONFIG.clone()).build() {
        Ok(op) => op,
        Err(e) => {
            eprintln!("[batch-cli] no se pudo crear el operator: {e}");
            std::process::exit(5);
        }
    };
    match sample_jobs() {
        Ok(jobs) => {
            for job in jobs {
                op.register_job(job);
            }
        }
        Err(e) => {
            eprintln!("[batch-cli] job de ejemplo inválido: {e}");
            std::process::exit(5);
        }
    }
    op
}

#[tokio::main]
async fn main() {
    // Cargar .env si existe (BATCH_MAX_THREADS, RUST_LOG, ...)
    let _ = dotenvy::dotenv();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let sink = Arc::new(Mutex::new(Vec::new()));
    let op = build_operator(sink.clone());

    match args.get(1).map(String::as_str) {
        Some("jobs") => {
            for name in op.get_job_names() {
                println!("{name}");
            }
        }
        Some("run") => {
            let Some(job) = args.get(2) else { usage() };
            let mut show_events = false;
            let mut params = Properties::new();
            for raw in &args[3..] {
                if raw == "--events" {
                    show_events = true;
                    continue;
                }
                match raw.split_once('=') {
                    Some((k, v)) if !k.is_empty() => {
                        params.insert(k.to_string(), v.to_string());
                    }
                    _ => eprintln!("[batch-cli] parámetro ignorado (se espera clave=valor): {raw}"),
                }
            }
            let code = run(&op, job, params, show_events).await;
            let written = sink.lock().len();
            if written > 0 {
                println!("items escritos: {written}");
            }
            std::process::exit(code);
        }
        _ => usage(),
    }
}

async fn run(op: &JobOperator, job: &str, params: Properties, show_events: bool) -> i32 {
    let instance = match op.start(job, params) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("[batch-cli] {e}");
            return 4;
        }
    };
    let execution = match op.latest_execution(instance) {
        Ok(Some(execution)) => execution,
        _ => {
            eprintln!("[batch-cli] la instancia {instance} no tiene ejecución");
            return 5;
        }
    };
    println!("job '{}' instancia {} ejecución {}", job, instance, execution.execution_id());

    // Ctrl-C pide un stop cooperativo; un segundo Ctrl-C ya no se escucha
    let mut stop_sent = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                stop_sent = true;
                match op.stop(instance) {
                    Ok(()) => eprintln!("[batch-cli] stop solicitado"),
                    Err(e) => eprintln!("[batch-cli] stop rechazado: {e}"),
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if execution.is_finished() {
                    break;
                }
            }
        }
    }

    if let Ok(steps) = op.get_step_executions(execution.execution_id()) {
        for step in steps {
            let m = step.metrics();
            println!("  {:<12} {:<10} {:<12} read={} write={} commit={} rollback={}",
                     step.step_name(),
                     step.status(),
                     step.exit_status().unwrap_or_default(),
                     m.read_count,
                     m.write_count,
                     m.commit_count,
                     m.rollback_count);
        }
    }
    if show_events {
        for event in op.events(execution.execution_id()) {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("[batch-cli] evento no serializable: {e}"),
            }
        }
    }
    let status = execution.status();
    println!("estado final: {} ({})", status, execution.exit_status().unwrap_or_default());
    if status == BatchStatus::Completed {
        0
    } else {
        1
    }
}

use std::sync::Arc;
use std::time::Duration;

use batchflow::samples::{sample_factory, sample_jobs};
use batchflow::{BatchStatus, EngineConfig, JobOperator, Properties};
use parking_lot::Mutex;
use serde_json::Value;

fn operator(sink: Arc<Mutex<Vec<Value>>>) -> JobOperator {
    let op = JobOperator::builder(Arc::new(sample_factory(sink))).config(EngineConfig::default().with_max_threads(4))
                                                                 .build()
                                                                 .unwrap();
    for job in sample_jobs().unwrap() {
        op.register_job(job);
    }
    op
}

fn run(op: &JobOperator, name: &str, params: Properties) -> BatchStatus {
    let instance = op.start(name, params).unwrap();
    let execution = op.latest_execution(instance).unwrap().unwrap();
    execution.wait_for_termination(Duration::from_secs(20)).expect("job did not finish")
}

fn sorted_ints(sink: &Mutex<Vec<Value>>) -> Vec<i64> {
    let mut out: Vec<i64> = sink.lock().iter().filter_map(Value::as_i64).collect();
    out.sort();
    out
}

#[test]
fn squares_job_writes_every_square() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let op = operator(sink.clone());

    assert_eq!(run(&op, "squares", Properties::new()), BatchStatus::Completed);
    assert_eq!(sorted_ints(&sink), (1..=20).map(|n| n * n).collect::<Vec<i64>>());
}

#[test]
fn fan_job_covers_the_whole_range_across_partitions() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let op = operator(sink.clone());

    assert_eq!(run(&op, "fan", Properties::new()), BatchStatus::Completed);
    assert_eq!(sorted_ints(&sink), (1..=100).map(|n| n * n).collect::<Vec<i64>>());
}

#[test]
fn parallel_job_completes_after_both_flows() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let op = operator(sink.clone());

    assert_eq!(run(&op, "parallel", Properties::new()), BatchStatus::Completed);
    assert_eq!(sorted_ints(&sink), (1..=10).collect::<Vec<i64>>());
    let execution = op.get_job_execution(1).unwrap();
    let mut names: Vec<String> = op.get_step_executions(execution.execution_id())
                                   .unwrap()
                                   .iter()
                                   .map(|s| s.step_name().to_string())
                                   .collect();
    names.sort();
    assert_eq!(names, vec!["long-nap", "short-nap", "square"]);
}

#[test]
fn nap_job_can_be_stopped() {
    let op = operator(Arc::new(Mutex::new(Vec::new())));
    let instance = op.start("nap", Properties::new()).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    op.stop(instance).unwrap();

    let execution = op.latest_execution(instance).unwrap().unwrap();
    assert_eq!(execution.wait_for_termination(Duration::from_secs(10)), Some(BatchStatus::Stopped));
}

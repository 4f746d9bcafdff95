mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use batch_core::artifact::Batchlet;
use batch_core::{
    ArtifactInstance, BatchError, BatchEventKind, BatchStatus, BatchletStep, ChunkStep, JobBuilder, OperatorError,
    Properties, RegistryArtifactFactory, Scope,
};
use common::*;

/// `stop()` avisa por `stopping` y no vuelve hasta que se abra `release`.
struct LatchedBatchlet {
    started: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    release: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl Batchlet for LatchedBatchlet {
    fn process(&self) -> Result<String, BatchError> {
        self.started.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.stopped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        Ok("LATCHED".into())
    }

    fn stop(&self) -> Result<(), BatchError> {
        self.stopping.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.release.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn stoppable_factory() -> (RegistryArtifactFactory, Arc<AtomicBool>) {
    let factory = RegistryArtifactFactory::new();
    register_batchlets(&factory);
    let started = Arc::new(AtomicBool::new(false));
    let s = started.clone();
    factory.register("stoppable", move |_| {
               Ok(ArtifactInstance::batchlet(StoppableBatchlet { started: s.clone(),
                                                                 stopped: Arc::new(AtomicBool::new(false)) }))
           });
    (factory, started)
}

#[test]
fn start_of_an_unknown_job_fails() {
    let op = operator(RegistryArtifactFactory::new());
    assert_eq!(op.start("ghost", Properties::new()), Err(OperatorError::NoSuchJob("ghost".into())));
    assert_eq!(op.get_job_instance_ids("ghost"), Err(OperatorError::NoSuchJob("ghost".into())));
}

#[test]
fn job_without_chainable_nodes_cannot_start() {
    let op = operator(RegistryArtifactFactory::new());
    op.register_job(JobBuilder::new("empty").build().unwrap());

    let err = op.start("empty", Properties::new()).unwrap_err();

    assert!(matches!(err, OperatorError::JobStart { ref job, .. } if job == "empty"));
    // no se creó ninguna instancia
    assert!(op.get_job_instance_ids("empty").unwrap().is_empty());
}

#[test]
fn stop_interrupts_a_running_batchlet() {
    let (factory, started) = stoppable_factory();
    let op = operator(factory);
    let mut b = JobBuilder::new("long");
    let wait = b.batchlet("wait", BatchletStep::new("stoppable"));
    let after = b.batchlet("after", BatchletStep::new("sleepy"));
    b.chain(Scope::Job, &[wait, after]).unwrap();
    op.register_job(b.build().unwrap());

    let instance = op.start("long", Properties::new()).unwrap();
    wait_until(&started);
    let execution = op.latest_execution(instance).unwrap().unwrap();
    assert_eq!(op.get_running_executions("long").unwrap(), vec![execution.execution_id()]);

    op.stop(instance).unwrap();

    assert_eq!(execution.wait_for_termination(Duration::from_secs(10)), Some(BatchStatus::Stopped));
    let steps = op.get_step_executions(execution.execution_id()).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status(), BatchStatus::Stopped);
    assert_eq!(steps[0].exit_status().as_deref(), Some("INTERRUPTED"));
    assert!(op.events(execution.execution_id())
              .iter()
              .any(|e| matches!(e.kind, BatchEventKind::StopRequested)));
    assert!(op.get_running_executions("long").unwrap().is_empty());

    // ya terminó: un segundo stop se rechaza
    assert_eq!(op.stop(instance), Err(OperatorError::JobExecutionNotRunning(execution.execution_id())));
}

#[test]
fn stop_passes_through_stopping_before_stopped() {
    let factory = RegistryArtifactFactory::new();
    let (started, stopping, release) =
        (Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false)));
    let (s, st, r) = (started.clone(), stopping.clone(), release.clone());
    factory.register("latched", move |_| {
               Ok(ArtifactInstance::batchlet(LatchedBatchlet { started: s.clone(),
                                                               stopping: st.clone(),
                                                               release: r.clone(),
                                                               stopped: AtomicBool::new(false) }))
           });
    let op = Arc::new(operator(factory));
    let mut b = JobBuilder::new("latched-job");
    let step = b.batchlet("hold", BatchletStep::new("latched"));
    b.add(step).unwrap();
    op.register_job(b.build().unwrap());

    let instance = op.start("latched-job", Properties::new()).unwrap();
    wait_until(&started);
    let execution = op.latest_execution(instance).unwrap().unwrap();

    let stopper = {
        let op = op.clone();
        thread::spawn(move || op.stop(instance))
    };
    wait_until(&stopping);

    // stop() del batchlet en curso: todo sigue en STOPPING
    assert_eq!(execution.status(), BatchStatus::Stopping);
    assert_eq!(status_of(&op, &execution, "hold"), BatchStatus::Stopping);

    release.store(true, Ordering::SeqCst);
    stopper.join().unwrap().unwrap();

    assert_eq!(execution.wait_for_termination(Duration::from_secs(10)), Some(BatchStatus::Stopped));
    assert_eq!(status_of(&op, &execution, "hold"), BatchStatus::Stopped);
}

#[test]
fn chunk_step_stops_at_a_checkpoint_boundary() {
    let factory = RegistryArtifactFactory::new();
    let out = sink();
    let o = out.clone();
    factory.register("endless", |_| {
               Ok(ArtifactInstance::reader(RangeReader::new(1, i64::MAX).paced(Duration::from_millis(1))))
           })
           .register("list", move |_| Ok(ArtifactInstance::writer(ListWriter::new(o.clone(), Default::default()))));
    let op = operator(factory);
    let mut b = JobBuilder::new("endless");
    let load = b.chunk("load", ChunkStep::new("endless", "list").commit_interval(5));
    b.add(load).unwrap();
    op.register_job(b.build().unwrap());

    let instance = op.start("endless", Properties::new()).unwrap();
    std::thread::sleep(Duration::from_millis(60));
    op.stop(instance).unwrap();
    let execution = op.latest_execution(instance).unwrap().unwrap();

    assert_eq!(execution.wait_for_termination(Duration::from_secs(10)), Some(BatchStatus::Stopped));
    let step = &op.get_step_executions(execution.execution_id()).unwrap()[0];
    assert_eq!(step.status(), BatchStatus::Stopped);
    // sólo intervalos completos llegan al writer
    assert_eq!(out.lock().len() % 5, 0);
    assert_eq!(step.metrics().write_count as usize, out.lock().len());
}

#[test]
fn queries_expose_instances_executions_and_parameters() {
    let factory = RegistryArtifactFactory::new();
    register_batchlets(&factory);
    let op = operator(factory);
    let mut b = JobBuilder::new("report");
    let only = b.batchlet("only", BatchletStep::new("sleepy"));
    b.add(only).unwrap();
    op.register_job(b.build().unwrap());
    let mut other = JobBuilder::new("another");
    let s = other.batchlet("s", BatchletStep::new("sleepy"));
    other.add(s).unwrap();
    op.register_job(other.build().unwrap());

    let mut params = Properties::new();
    params.insert("date".into(), "2024-01-31".into());
    let execution = run_with(&op, "report", params.clone());
    run_to_end(&op, "report");

    assert_eq!(op.get_job_names(), vec!["another", "report"]);
    let ids = op.get_job_instance_ids("report").unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1]);
    assert_eq!(op.get_parameters(execution.execution_id()).unwrap(), params);

    let instance = op.get_job_instance(execution.instance().instance_id()).unwrap();
    assert_eq!(instance.job_name(), "report");
    assert_eq!(instance.execution_ids(), vec![execution.execution_id()]);

    let step = op.get_step_executions(execution.execution_id()).unwrap().remove(0);
    assert_eq!(op.get_step_execution(execution.execution_id(), step.id()).unwrap().id(), step.id());
    assert_eq!(op.get_step_execution(execution.execution_id(), 9_999).unwrap_err(),
               OperatorError::NoSuchStepExecution { job_execution_id: execution.execution_id(),
                                                    step_execution_id: 9_999 });
    assert_eq!(op.get_job_execution(9_999).unwrap_err(), OperatorError::NoSuchJobExecution(9_999));
    assert_eq!(op.get_job_instance(9_999).unwrap_err(), OperatorError::NoSuchJobInstance(9_999));
}

#[test]
fn restart_is_not_supported() {
    let op = operator(RegistryArtifactFactory::new());
    assert_eq!(op.restart(1, Properties::new()), Err(OperatorError::Unsupported("restart")));
    assert!(matches!(op.get_job_executions(1), Err(OperatorError::Unsupported(_))));
}

mod common;

use std::sync::Arc;

use batch_core::artifact::Decider;
use batch_core::{
    ArtifactInstance, BatchError, BatchEventKind, BatchStatus, BatchletStep, Decision, JobBuilder,
    RegistryArtifactFactory, Scope, StepExecution, Transition,
};
use common::*;
use parking_lot::Mutex;

/// Decide con el exit status de la última step execution recibida.
struct LastExitStatus;

impl Decider for LastExitStatus {
    fn decide(&self, executions: &[Arc<StepExecution>]) -> Result<String, BatchError> {
        executions.last()
                  .and_then(|e| e.exit_status())
                  .ok_or_else(|| BatchError::other("nothing to decide on"))
    }
}

fn factory() -> RegistryArtifactFactory {
    let factory = RegistryArtifactFactory::new();
    register_batchlets(&factory);
    factory.register("lastExit", |_| Ok(ArtifactInstance::decider(LastExitStatus)));
    factory
}

fn step_names(op: &batch_core::JobOperator, execution_id: u64) -> Vec<String> {
    op.get_step_executions(execution_id)
      .unwrap()
      .iter()
      .map(|s| s.step_name().to_string())
      .collect()
}

#[test]
fn chain_runs_in_order_with_listeners_around_it() {
    let factory = factory();
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    factory.register("recorder", move |_| Ok(ArtifactInstance::listener(RecordingListener(l.clone()))));
    let op = operator(factory);

    let mut b = JobBuilder::new("chain");
    b.listener("recorder");
    let first = b.batchlet("first", BatchletStep::new("sleepy").listener("recorder"));
    let second = b.batchlet("second", BatchletStep::new("sleepy"));
    b.chain(Scope::Job, &[first, second]).unwrap();
    op.register_job(b.build().unwrap());

    let execution = run_to_end(&op, "chain");

    assert_eq!(execution.status(), BatchStatus::Completed);
    assert_eq!(step_names(&op, execution.execution_id()), vec!["first", "second"]);
    assert_eq!(*log.lock(), vec!["before_job", "before_step", "after_step", "after_job"]);

    let events = op.events(execution.execution_id());
    assert!(matches!(events.first().map(|e| &e.kind), Some(BatchEventKind::JobStarted { .. })));
    assert!(matches!(events.last().map(|e| &e.kind),
                     Some(BatchEventKind::JobFinished { status: BatchStatus::Completed, .. })));
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..events.len() as u64).collect::<Vec<_>>());
}

#[test]
fn failed_step_stops_the_chain() {
    let op = operator(factory());
    let mut b = JobBuilder::new("broken");
    let boom = b.batchlet("boom", BatchletStep::new("failing"));
    let never = b.batchlet("never", BatchletStep::new("sleepy"));
    b.chain(Scope::Job, &[boom, never]).unwrap();
    op.register_job(b.build().unwrap());

    let execution = run_to_end(&op, "broken");

    assert_eq!(execution.status(), BatchStatus::Failed);
    assert_eq!(step_names(&op, execution.execution_id()), vec!["boom"]);
}

#[test]
fn split_flows_run_and_the_job_waits_for_all_of_them() {
    let op = operator(factory());
    let mut b = JobBuilder::new("split-job");
    let split = b.split("fan");
    let left = b.flow("left");
    let right = b.flow("right");
    let slow = b.batchlet("slow", BatchletStep::new("sleepy"));
    b.node_property(slow, "millis", "120").unwrap();
    let quick = b.batchlet("quick", BatchletStep::new("sleepy"));
    let tail = b.batchlet("tail", BatchletStep::new("sleepy"));
    b.attach(Scope::Node(left), slow).unwrap();
    b.attach(Scope::Node(right), quick).unwrap();
    b.attach(Scope::Node(split), left).unwrap();
    b.attach(Scope::Node(split), right).unwrap();
    b.chain(Scope::Job, &[split, tail]).unwrap();
    op.register_job(b.build().unwrap());

    let execution = run_to_end(&op, "split-job");

    assert_eq!(execution.status(), BatchStatus::Completed);
    let mut names = step_names(&op, execution.execution_id());
    names.sort();
    assert_eq!(names, vec!["quick", "slow", "tail"]);
    assert_eq!(status_of(&op, &execution, "slow"), BatchStatus::Completed);
    // la ejecución sólo se cierra tras el flow más lento
    let slow_end = op.get_step_executions(execution.execution_id())
                     .unwrap()
                     .into_iter()
                     .find(|s| s.step_name() == "slow")
                     .and_then(|s| s.end_time())
                     .unwrap();
    assert!(execution.end_time().unwrap() >= slow_end);
}

#[test]
fn failure_in_one_split_flow_fails_the_job_but_not_its_sibling() {
    let op = operator(factory());
    let mut b = JobBuilder::new("split-fail");
    let split = b.split("fan");
    let left = b.flow("left");
    let right = b.flow("right");
    let boom = b.batchlet("boom", BatchletStep::new("failing"));
    let fine = b.batchlet("fine", BatchletStep::new("sleepy"));
    b.node_property(fine, "millis", "50").unwrap();
    b.attach(Scope::Node(left), boom).unwrap();
    b.attach(Scope::Node(right), fine).unwrap();
    b.attach(Scope::Node(split), left).unwrap();
    b.attach(Scope::Node(split), right).unwrap();
    b.add(split).unwrap();
    op.register_job(b.build().unwrap());

    let execution = run_to_end(&op, "split-fail");

    assert_eq!(execution.status(), BatchStatus::Failed);
    assert_eq!(status_of(&op, &execution, "boom"), BatchStatus::Failed);
    assert_eq!(status_of(&op, &execution, "fine"), BatchStatus::Completed);
}

fn decision_job(name: &str, first_exit: &str, decision: Decision) -> batch_core::Job {
    let mut b = JobBuilder::new(name);
    let check = b.batchlet("check", BatchletStep::new("sleepy"));
    b.node_property(check, "exit", first_exit).unwrap();
    let route = b.decision("route", decision);
    let cleanup = b.batchlet("cleanup", BatchletStep::new("sleepy"));
    let archive = b.batchlet("archive", BatchletStep::new("sleepy"));
    b.chain(Scope::Job, &[check, route, cleanup]).unwrap();
    b.add(archive).unwrap();
    b.build().unwrap()
}

#[test]
fn decision_next_jumps_to_the_named_sibling() {
    let op = operator(factory());
    let decision = Decision::new("lastExit").transition(Transition::next("SKIP*", "archive"))
                                            .transition(Transition::end("*"));
    op.register_job(decision_job("decide-next", "SKIP_CLEANUP", decision));

    let execution = run_to_end(&op, "decide-next");

    assert_eq!(execution.status(), BatchStatus::Completed);
    assert_eq!(step_names(&op, execution.execution_id()), vec!["check", "archive"]);
    let made = op.events(execution.execution_id()).into_iter().find_map(|e| match e.kind {
                                                                    BatchEventKind::DecisionMade { transition, .. } => transition,
                                                                    _ => None,
                                                                });
    assert_eq!(made.as_deref(), Some("next:archive"));
}

#[test]
fn decision_fail_sets_status_and_exit_status() {
    let op = operator(factory());
    let decision = Decision::new("lastExit").transition(Transition::Fail { on: "BAD".into(),
                                                                           exit_status: Some("REJECTED".into()) })
                                            .transition(Transition::next("*", "cleanup"));
    op.register_job(decision_job("decide-fail", "BAD", decision));

    let execution = run_to_end(&op, "decide-fail");

    assert_eq!(execution.status(), BatchStatus::Failed);
    assert_eq!(execution.exit_status().as_deref(), Some("REJECTED"));
    assert_eq!(step_names(&op, execution.execution_id()), vec!["check"]);
}

#[test]
fn decision_end_completes_without_running_the_rest() {
    let op = operator(factory());
    let decision = Decision::new("lastExit").transition(Transition::end("DONE"));
    op.register_job(decision_job("decide-end", "DONE", decision));

    let execution = run_to_end(&op, "decide-end");

    assert_eq!(execution.status(), BatchStatus::Completed);
    assert_eq!(execution.exit_status().as_deref(), Some("DONE"));
    assert_eq!(step_names(&op, execution.execution_id()), vec!["check"]);
}

#[test]
fn unmatched_decision_fails_the_job() {
    let op = operator(factory());
    let decision = Decision::new("lastExit").transition(Transition::end("NEVER"));
    op.register_job(decision_job("decide-none", "SOMETHING", decision));

    let execution = run_to_end(&op, "decide-none");

    assert_eq!(execution.status(), BatchStatus::Failed);
}

//! Evaluación de nodos de decisión.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{error, info, warn};

use crate::artifact::{ArtifactContainer, SharedDecider};
use crate::context::JobContext;
use crate::errors::BatchError;
use crate::event::BatchEventKind;
use crate::model::{Decision, Node, Transition};
use crate::repo::{BatchStatus, StepExecution};
use crate::task::panic_message;

use super::walker::Transit;
use super::JobRun;

pub(crate) fn evaluate(run: &Arc<JobRun>,
                       job_ctx: &JobContext,
                       node: &Node,
                       decision: &Decision,
                       previous: &[Arc<StepExecution>])
                       -> Transit {
    let execution_id = job_ctx.execution_id();
    let mut container = ArtifactContainer::new(run.engine.factory.clone());
    let decided = panic::catch_unwind(AssertUnwindSafe(|| -> Result<String, BatchError> {
                      let decider: SharedDecider = container.create(&decision.decider, job_ctx, None)?;
                      decider.decide(previous)
                  }));
    if let Err(e) = container.release() {
        warn!("decision '{}': releasing decider failed: {}", node.id(), e);
    }
    let exit_status = match decided {
        Ok(Ok(exit_status)) => exit_status,
        Ok(Err(e)) => return failed(run, node, &e.to_string()),
        Err(payload) => return failed(run, node, &panic_message(payload.as_ref())),
    };

    job_ctx.set_exit_status(exit_status.clone());
    let transition = decision.select(&exit_status);
    run.engine.emit(execution_id,
                    BatchEventKind::DecisionMade { decision: node.id().to_string(),
                                                   exit_status: exit_status.clone(),
                                                   transition: transition.map(label) });
    let Some(transition) = transition else {
        return failed(run, node, &format!("no transition matches exit status '{}'", exit_status));
    };
    info!("decision '{}': '{}' -> {}", node.id(), exit_status, label(transition));

    let (status, overridden) = match transition {
        Transition::Next { to, .. } => return Transit::Jump(to.clone()),
        Transition::End { exit_status, .. } => (BatchStatus::Completed, exit_status),
        Transition::Fail { exit_status, .. } => (BatchStatus::Failed, exit_status),
        Transition::Stop { exit_status, .. } => (BatchStatus::Stopped, exit_status),
    };
    if let Some(exit) = overridden {
        job_ctx.set_exit_status(exit.clone());
    }
    run.decide(status);
    Transit::Halt
}

fn label(transition: &Transition) -> String {
    match transition {
        Transition::Next { to, .. } => format!("next:{}", to),
        Transition::End { .. } => "end".to_string(),
        Transition::Fail { .. } => "fail".to_string(),
        Transition::Stop { .. } => "stop".to_string(),
    }
}

fn failed(run: &JobRun, node: &Node, reason: &str) -> Transit {
    error!("job '{}' execution {}: decision '{}' failed: {}",
           run.job.id(),
           run.execution.execution_id(),
           node.id(),
           reason);
    run.mark_failed();
    Transit::Halt
}

//! Ciclo de vida común a batchlet y chunk steps.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{error, info, warn};

use crate::artifact::{ArtifactContainer, SharedListener};
use crate::context::{JobContext, StepContext};
use crate::errors::BatchError;
use crate::event::BatchEventKind;
use crate::model::{Job, Node, NodeKind, PartitionConfig};
use crate::repo::BatchStatus;
use crate::task::panic_message;

use super::walker::Transit;
use super::{batchlet, chunk, partition, JobRun};

/// Ejecuta un step completo: crea su `StepExecution`, corre listeners y
/// cuerpo, libera artifacts y decide si la cadena sigue.
pub(crate) fn run_step(run: &Arc<JobRun>, job_ctx: &JobContext, job: &Job, node: &Node) -> Transit {
    let engine = &run.engine;
    let execution_id = run.execution.execution_id();
    let step_execution = engine.repository.create_step_execution(node, &run.execution);
    step_execution.mark_started();
    engine.emit(execution_id,
                BatchEventKind::StepStarted { step: node.id().to_string(),
                                              step_execution_id: step_execution.id() });
    info!("job '{}' execution {}: step '{}' started", job.id(), execution_id, node.id());

    let step_ctx = StepContext::new(node.index(),
                                    node.properties().clone(),
                                    step_execution.clone(),
                                    run.execution.clone());
    let mut container = ArtifactContainer::new(engine.factory.clone());

    let body = panic::catch_unwind(AssertUnwindSafe(|| execute(run, job_ctx, &step_ctx, node, &mut container)));
    let mut status = match body {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => fail(job, execution_id, &step_ctx, e),
        Err(payload) => fail(job, execution_id, &step_ctx, BatchError::Panicked(panic_message(payload.as_ref()))),
    };

    step_execution.set_status(status);
    for listener in container.created::<SharedListener>() {
        if let Some(l) = listener.as_step_listener() {
            if let Err(e) = l.after_step() {
                status = fail(job, execution_id, &step_ctx, e);
            }
        }
    }
    if let Err(e) = container.release() {
        warn!("step '{}': releasing artifacts failed: {}", node.id(), e);
    }

    step_execution.finish(status);
    let exit_status = step_execution.exit_status().unwrap_or_else(|| status.to_string());
    engine.emit(execution_id,
                BatchEventKind::StepFinished { step: node.id().to_string(),
                                               step_execution_id: step_execution.id(),
                                               status,
                                               exit_status: exit_status.clone() });
    info!("job '{}' execution {}: step '{}' finished: {} ({})",
          job.id(),
          execution_id,
          node.id(),
          status,
          exit_status);

    match status {
        BatchStatus::Failed => {
            run.mark_failed();
            Transit::Halt
        }
        BatchStatus::Stopped | BatchStatus::Stopping => {
            run.mark_stopped();
            Transit::Halt
        }
        _ => Transit::Continue(vec![step_execution]),
    }
}

fn fail(job: &Job, execution_id: u64, step_ctx: &StepContext, error: BatchError) -> BatchStatus {
    error!("job '{}' execution {}: step '{}' failed: {}",
           job.id(),
           execution_id,
           step_ctx.step_name(),
           error);
    step_ctx.record_error(error.to_string());
    BatchStatus::Failed
}

fn execute(run: &Arc<JobRun>,
           job_ctx: &JobContext,
           step_ctx: &StepContext,
           node: &Node,
           container: &mut ArtifactContainer)
           -> Result<BatchStatus, BatchError> {
    if step_ctx.is_stop_requested() {
        return Ok(BatchStatus::Stopped);
    }
    for listener in node.listeners() {
        container.create::<SharedListener>(listener, job_ctx, Some(step_ctx))?;
    }
    for listener in container.created::<SharedListener>() {
        if let Some(l) = listener.as_step_listener() {
            l.before_step()?;
        }
    }
    if let Some(config) = partition_config(node) {
        return partition::run_partitioned(run, job_ctx, step_ctx, node, config, container);
    }
    match node.kind() {
        NodeKind::Batchlet(step) => batchlet::run_batchlet(&run.engine, step, job_ctx, step_ctx, container),
        NodeKind::Chunk(step) => chunk::run_chunk(&run.engine, step, job_ctx, step_ctx, container),
        other => Err(BatchError::other(format!("'{}' is a {}, not a step", node.id(), other.label()))),
    }
}

pub(crate) fn partition_config(node: &Node) -> Option<&PartitionConfig> {
    match node.kind() {
        NodeKind::Batchlet(step) => step.partition.as_ref(),
        NodeKind::Chunk(step) => step.partition.as_ref(),
        _ => None,
    }
}

//! Cuerpo de un batchlet step (o de una partición de uno).
use log::debug;

use crate::artifact::{ArtifactContainer, SharedBatchlet};
use crate::context::{JobContext, StepContext};
use crate::errors::BatchError;
use crate::model::BatchletStep;
use crate::repo::BatchStatus;

use super::Engine;

/// Invoca `process()` una sola vez. Mientras corre, el batchlet queda
/// registrado para que `stop()` del operator pueda alcanzarlo. Sin retry.
pub(crate) fn run_batchlet(engine: &Engine,
                           step: &BatchletStep,
                           job_ctx: &JobContext,
                           step_ctx: &StepContext,
                           container: &mut ArtifactContainer)
                           -> Result<BatchStatus, BatchError> {
    let batchlet: SharedBatchlet = container.create(&step.batchlet, job_ctx, Some(step_ctx))?;
    let _running = engine.register_batchlet(job_ctx.execution_id(), step_ctx.execution().clone(), batchlet.clone());
    if step_ctx.is_stop_requested() {
        return Ok(BatchStatus::Stopped);
    }

    let exit_status = batchlet.process()?;
    debug!("batchlet '{}' in step '{}' returned '{}'",
           step.batchlet.reference,
           step_ctx.step_name(),
           exit_status);
    step_ctx.set_exit_status(exit_status);

    // stop() del operator ya pudo marcar el step como STOPPED
    if step_ctx.is_stop_requested() {
        Ok(BatchStatus::Stopped)
    } else {
        Ok(BatchStatus::Completed)
    }
}

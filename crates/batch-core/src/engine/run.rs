//! Cuerpo asíncrono de una ejecución de job.
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::artifact::{ArtifactContainer, SharedListener};
use crate::context::JobContext;
use crate::errors::BatchError;
use crate::event::BatchEventKind;
use crate::model::{Job, NodeId, Scope};
use crate::repo::{BatchStatus, JobExecution};
use crate::task::panic_message;

use super::walker::Walker;
use super::Engine;

#[derive(Debug, Default)]
struct Outcome {
    failed: bool,
    stopped: bool,
    /// Estado fijado por una transición end/fail/stop de una decisión.
    decided: Option<BatchStatus>,
}

/// Estado de una ejecución en curso.
///
/// `outstanding` cuenta las ramas vivas: la cadena principal más un flow por
/// cada hijo de split lanzado. La ejecución se cierra (after-job, estado
/// terminal) cuando la última rama termina.
pub struct JobRun {
    pub(crate) engine: Arc<Engine>,
    pub(crate) job: Arc<Job>,
    pub(crate) execution: Arc<JobExecution>,
    context: JobContext,
    container: Mutex<Option<ArtifactContainer>>,
    outstanding: AtomicUsize,
    outcome: Mutex<Outcome>,
}

impl JobRun {
    /// Lanza el cuerpo del job en el pool compartido y vuelve enseguida.
    pub(crate) fn start(engine: Arc<Engine>, execution: Arc<JobExecution>) {
        let job = execution.instance().job().clone();
        let context = JobContext::new(job.clone(), execution.clone());
        let run = Arc::new(JobRun { engine: engine.clone(),
                                    job,
                                    execution,
                                    context,
                                    container: Mutex::new(None),
                                    outstanding: AtomicUsize::new(1),
                                    outcome: Mutex::new(Outcome::default()) });
        engine.tasks.submit(move || run.body());
    }

    fn body(self: Arc<Self>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute()));
        if let Err(payload) = outcome {
            error!("job '{}' execution {}: job body panicked: {}",
                   self.job.id(),
                   self.execution.execution_id(),
                   panic_message(payload.as_ref()));
            self.mark_failed();
        }
        self.branch_finished();
    }

    fn execute(self: &Arc<Self>) {
        let execution_id = self.execution.execution_id();
        self.execution.mark_started();
        self.engine.emit(execution_id,
                         BatchEventKind::JobStarted { job_name: self.job.id().to_string(),
                                                      definition_hash: self.job.definition_hash().to_string() });
        info!("job '{}' execution {} started", self.job.id(), execution_id);

        let mut container = ArtifactContainer::new(self.engine.factory.clone());
        let before = self.before_job(&mut container);
        *self.container.lock() = Some(container);
        if let Err(e) = before {
            error!("job '{}' execution {}: before-job failed: {}", self.job.id(), execution_id, e);
            self.mark_failed();
            return;
        }

        Walker::new(self.clone(), self.context.clone()).walk(Scope::Job);
    }

    fn before_job(&self, container: &mut ArtifactContainer) -> Result<(), BatchError> {
        for listener in self.job.listeners() {
            container.create::<SharedListener>(listener, &self.context, None)?;
        }
        for listener in container.created::<SharedListener>() {
            if let Some(l) = listener.as_job_listener() {
                l.before_job()?;
            }
        }
        Ok(())
    }

    /// Lanza un flow de split como rama independiente con contexto propio.
    pub(crate) fn spawn_branch(self: &Arc<Self>, context: JobContext, flow: NodeId) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let run = self.clone();
        self.engine.tasks.submit(move || {
                             let job = run.job.clone();
                             let walked = panic::catch_unwind(AssertUnwindSafe(|| {
                                              Walker::new(run.clone(), context).visit(&job, job.node(flow), &[])
                                          }));
                             if let Err(payload) = walked {
                                 error!("job '{}' execution {}: flow '{}' panicked: {}",
                                        run.job.id(),
                                        run.execution.execution_id(),
                                        job.node(flow).id(),
                                        panic_message(payload.as_ref()));
                                 run.mark_failed();
                             }
                             run.branch_finished();
                         });
    }

    fn branch_finished(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finalize();
        }
    }

    fn finalize(&self) {
        let execution_id = self.execution.execution_id();
        let container = self.container.lock().take();
        if let Some(mut container) = container {
            for listener in container.created::<SharedListener>() {
                if let Some(l) = listener.as_job_listener() {
                    if let Err(e) = l.after_job() {
                        error!("job '{}' execution {}: after-job failed: {}", self.job.id(), execution_id, e);
                        self.mark_failed();
                    }
                }
            }
            if let Err(e) = container.release() {
                warn!("job '{}' execution {}: releasing job artifacts failed: {}", self.job.id(), execution_id, e);
            }
        }

        let status = self.final_status();
        let exit_status = self.execution.exit_status().unwrap_or_else(|| status.to_string());
        // el evento va antes de `finish`: quien espera la terminación ya lo ve
        self.engine.emit(execution_id,
                         BatchEventKind::JobFinished { status,
                                                       exit_status: exit_status.clone() });
        self.execution.finish(status);
        info!("job '{}' execution {} finished: {} ({})", self.job.id(), execution_id, status, exit_status);
    }

    fn final_status(&self) -> BatchStatus {
        let outcome = self.outcome.lock();
        if outcome.failed {
            BatchStatus::Failed
        } else if let Some(decided) = outcome.decided {
            decided
        } else if outcome.stopped || self.execution.status() == BatchStatus::Stopping {
            BatchStatus::Stopped
        } else {
            BatchStatus::Completed
        }
    }

    pub(crate) fn mark_failed(&self) {
        self.outcome.lock().failed = true;
    }

    pub(crate) fn mark_stopped(&self) {
        self.outcome.lock().stopped = true;
    }

    pub(crate) fn decide(&self, status: BatchStatus) {
        self.outcome.lock().decided.get_or_insert(status);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.execution.status() == BatchStatus::Stopping
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn execution(&self) -> &Arc<JobExecution> {
        &self.execution
    }
}

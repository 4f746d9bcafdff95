use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::model::{Job, Properties};
use crate::repo::{BatchStatus, JobExecution};

#[derive(Debug)]
struct JobContextInner {
    job: Arc<Job>,
    execution: Arc<JobExecution>,
    /// `Some` en contextos de partición: el exit status queda local y no
    /// pisa el de la ejecución.
    local_exit_status: Option<Mutex<Option<String>>>,
    transient_user_data: Mutex<Option<Value>>,
}

/// Vista del job en ejecución. Clonarlo es barato y comparte el mismo estado.
#[derive(Debug, Clone)]
pub struct JobContext {
    inner: Arc<JobContextInner>,
}

impl JobContext {
    pub(crate) fn new(job: Arc<Job>, execution: Arc<JobExecution>) -> Self {
        Self { inner: Arc::new(JobContextInner { job,
                                                 execution,
                                                 local_exit_status: None,
                                                 transient_user_data: Mutex::new(None) }) }
    }

    /// Contexto nuevo sobre la misma ejecución, sin datos transitorios.
    /// Lo usan los flows de un split.
    pub(crate) fn fresh(&self) -> Self {
        Self::new(self.inner.job.clone(), self.inner.execution.clone())
    }

    /// Contexto independiente para una partición: mismo job y ejecución, pero
    /// exit status y datos transitorios propios.
    pub(crate) fn detached(&self) -> Self {
        Self { inner: Arc::new(JobContextInner { job: self.inner.job.clone(),
                                                 execution: self.inner.execution.clone(),
                                                 local_exit_status: Some(Mutex::new(None)),
                                                 transient_user_data: Mutex::new(None) }) }
    }

    pub fn job_name(&self) -> &str {
        self.inner.job.id()
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.inner.job
    }

    pub fn execution(&self) -> &Arc<JobExecution> {
        &self.inner.execution
    }

    pub fn instance_id(&self) -> u64 {
        self.inner.execution.instance().instance_id()
    }

    pub fn execution_id(&self) -> u64 {
        self.inner.execution.execution_id()
    }

    /// Propiedades declaradas en el job.
    pub fn properties(&self) -> &Properties {
        self.inner.job.properties()
    }

    /// Parámetros de arranque de la ejecución.
    pub fn parameters(&self) -> &Properties {
        self.inner.execution.parameters()
    }

    pub fn batch_status(&self) -> BatchStatus {
        self.inner.execution.status()
    }

    pub fn exit_status(&self) -> Option<String> {
        match &self.inner.local_exit_status {
            Some(local) => local.lock().clone(),
            None => self.inner.execution.exit_status(),
        }
    }

    pub fn set_exit_status(&self, exit_status: impl Into<String>) {
        match &self.inner.local_exit_status {
            Some(local) => *local.lock() = Some(exit_status.into()),
            None => self.inner.execution.set_exit_status(exit_status),
        }
    }

    pub fn transient_user_data(&self) -> Option<Value> {
        self.inner.transient_user_data.lock().clone()
    }

    pub fn set_transient_user_data(&self, data: Value) {
        *self.inner.transient_user_data.lock() = Some(data);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.execution.status() == BatchStatus::Stopping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobBuilder;
    use crate::repo::JobInstance;

    fn context() -> JobContext {
        let job = Arc::new(JobBuilder::new("job").build().unwrap());
        let instance = Arc::new(JobInstance::new(1, job.clone()));
        JobContext::new(job, Arc::new(JobExecution::new(7, instance, Properties::new())))
    }

    #[test]
    fn exit_status_goes_to_the_execution() {
        let ctx = context();
        ctx.set_exit_status("DONE");
        assert_eq!(ctx.execution().exit_status().as_deref(), Some("DONE"));
        assert_eq!(ctx.execution_id(), 7);
    }

    #[test]
    fn detached_context_keeps_its_own_exit_status() {
        let ctx = context();
        let partition = ctx.detached();
        partition.set_exit_status("PARTIAL");
        assert_eq!(partition.exit_status().as_deref(), Some("PARTIAL"));
        assert_eq!(ctx.exit_status(), None);
    }

    #[test]
    fn fresh_context_drops_transient_data() {
        let ctx = context();
        ctx.set_transient_user_data(serde_json::json!(1));
        assert!(ctx.fresh().transient_user_data().is_none());
        assert!(ctx.clone().transient_user_data().is_some());
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::model::{NodeId, Properties};
use crate::repo::{BatchStatus, JobExecution, MetricsSnapshot, StepExecution};

#[derive(Debug)]
struct StepContextInner {
    node: NodeId,
    properties: Properties,
    execution: Arc<StepExecution>,
    job_execution: Arc<JobExecution>,
    partition: Option<usize>,
    local_exit_status: Mutex<Option<String>>,
    transient_user_data: Mutex<Option<Value>>,
    last_error: Mutex<Option<String>>,
}

/// Vista de un step (o de una partición de un step) en ejecución.
#[derive(Debug, Clone)]
pub struct StepContext {
    inner: Arc<StepContextInner>,
}

impl StepContext {
    pub(crate) fn new(node: NodeId,
                      properties: Properties,
                      execution: Arc<StepExecution>,
                      job_execution: Arc<JobExecution>)
                      -> Self {
        Self::build(node, properties, execution, job_execution, None)
    }

    /// Contexto de la partición `index`; `properties` ya trae mezclados los
    /// overrides de esa partición.
    pub(crate) fn for_partition(node: NodeId,
                                properties: Properties,
                                execution: Arc<StepExecution>,
                                job_execution: Arc<JobExecution>,
                                index: usize)
                                -> Self {
        Self::build(node, properties, execution, job_execution, Some(index))
    }

    fn build(node: NodeId,
             properties: Properties,
             execution: Arc<StepExecution>,
             job_execution: Arc<JobExecution>,
             partition: Option<usize>)
             -> Self {
        Self { inner: Arc::new(StepContextInner { node,
                                                  properties,
                                                  execution,
                                                  job_execution,
                                                  partition,
                                                  local_exit_status: Mutex::new(None),
                                                  transient_user_data: Mutex::new(None),
                                                  last_error: Mutex::new(None) }) }
    }

    pub fn step_name(&self) -> &str {
        self.inner.execution.step_name()
    }

    pub fn node(&self) -> NodeId {
        self.inner.node
    }

    pub fn step_execution_id(&self) -> u64 {
        self.inner.execution.id()
    }

    pub fn execution(&self) -> &Arc<StepExecution> {
        &self.inner.execution
    }

    pub fn job_execution(&self) -> &Arc<JobExecution> {
        &self.inner.job_execution
    }

    /// Índice de partición, `None` fuera de un step particionado.
    pub fn partition(&self) -> Option<usize> {
        self.inner.partition
    }

    /// Propiedades del step (con overrides de partición si aplica).
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.inner.properties.get(key).map(String::as_str)
    }

    pub fn batch_status(&self) -> BatchStatus {
        self.inner.execution.status()
    }

    /// En una partición el exit status es local a ella; fuera, es el de la
    /// step execution.
    pub fn exit_status(&self) -> Option<String> {
        match self.inner.partition {
            Some(_) => self.inner.local_exit_status.lock().clone(),
            None => self.inner.execution.exit_status(),
        }
    }

    pub fn set_exit_status(&self, exit_status: impl Into<String>) {
        match self.inner.partition {
            Some(_) => *self.inner.local_exit_status.lock() = Some(exit_status.into()),
            None => self.inner.execution.set_exit_status(exit_status),
        }
    }

    pub fn persistent_user_data(&self) -> Option<Value> {
        self.inner.execution.persistent_user_data()
    }

    pub fn set_persistent_user_data(&self, data: Value) {
        self.inner.execution.set_persistent_user_data(data);
    }

    pub fn transient_user_data(&self) -> Option<Value> {
        self.inner.transient_user_data.lock().clone()
    }

    pub fn set_transient_user_data(&self, data: Value) {
        *self.inner.transient_user_data.lock() = Some(data);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.execution.metrics()
    }

    /// Último error registrado por el motor en este step.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    pub(crate) fn record_error(&self, error: impl Into<String>) {
        *self.inner.last_error.lock() = Some(error.into());
    }

    /// Stop cooperativo: el job o el propio step fueron marcados para parar.
    pub fn is_stop_requested(&self) -> bool {
        matches!(self.inner.execution.status(), BatchStatus::Stopping | BatchStatus::Stopped)
        || self.inner.job_execution.status() == BatchStatus::Stopping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobBuilder;
    use crate::repo::JobInstance;

    fn parts() -> (Arc<StepExecution>, Arc<JobExecution>) {
        let job = Arc::new(JobBuilder::new("job").build().unwrap());
        let instance = Arc::new(JobInstance::new(1, job));
        (Arc::new(StepExecution::new(3, 1, "s1".into(), NodeId(0))),
         Arc::new(JobExecution::new(1, instance, Properties::new())))
    }

    #[test]
    fn partition_exit_status_is_local() {
        let (step, job) = parts();
        let ctx = StepContext::for_partition(NodeId(0), Properties::new(), step.clone(), job.clone(), 2);
        ctx.set_exit_status("P2");
        assert_eq!(ctx.exit_status().as_deref(), Some("P2"));
        assert!(step.exit_status().is_none());

        let ctx = StepContext::new(NodeId(0), Properties::new(), step.clone(), job);
        ctx.set_exit_status("MAIN");
        assert_eq!(step.exit_status().as_deref(), Some("MAIN"));
    }

    #[test]
    fn stop_is_seen_from_job_or_step() {
        let (step, job) = parts();
        let ctx = StepContext::new(NodeId(0), Properties::new(), step.clone(), job.clone());
        assert!(!ctx.is_stop_requested());
        job.set_status(BatchStatus::Stopping);
        assert!(ctx.is_stop_requested());
        job.set_status(BatchStatus::Started);
        step.set_status(BatchStatus::Stopped);
        assert!(ctx.is_stop_requested());
    }
}

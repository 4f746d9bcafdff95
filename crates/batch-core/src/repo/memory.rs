//! Repositorio en memoria.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::errors::RepositoryError;
use crate::model::{Job, Node, Properties};

use super::{JobExecution, JobInstance, StepExecution};

/// Almacén de instancias y ejecuciones indexado por id.
///
/// Se comparte entre los hilos del pool; las implementaciones deben
/// tolerar inserciones y búsquedas concurrentes sin locking externo.
pub trait JobRepository: Send + Sync {
    fn create_job_instance(&self, job: Arc<Job>) -> Arc<JobInstance>;
    fn create_job_execution(&self, instance: &Arc<JobInstance>, parameters: Properties) -> Arc<JobExecution>;
    fn create_step_execution(&self, step: &Node, execution: &JobExecution) -> Arc<StepExecution>;

    fn job_instance(&self, instance_id: u64) -> Result<Arc<JobInstance>, RepositoryError>;
    fn job_execution(&self, execution_id: u64) -> Result<Arc<JobExecution>, RepositoryError>;
    fn step_execution(&self, step_execution_id: u64) -> Result<Arc<StepExecution>, RepositoryError>;

    /// Instancias de un job, en orden de creación.
    fn job_instances(&self, job_name: &str) -> Vec<Arc<JobInstance>>;
    /// Step executions de una ejecución, en orden de creación.
    fn step_executions(&self, execution_id: u64) -> Result<Vec<Arc<StepExecution>>, RepositoryError> {
        let execution = self.job_execution(execution_id)?;
        execution.step_execution_ids().into_iter().map(|id| self.step_execution(id)).collect()
    }
}

pub struct InMemoryJobRepository {
    instances: DashMap<u64, Arc<JobInstance>>,
    executions: DashMap<u64, Arc<JobExecution>>,
    step_executions: DashMap<u64, Arc<StepExecution>>,
    next_instance_id: AtomicU64,
    next_execution_id: AtomicU64,
    next_step_execution_id: AtomicU64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self { instances: DashMap::new(),
               executions: DashMap::new(),
               step_executions: DashMap::new(),
               next_instance_id: AtomicU64::new(1),
               next_execution_id: AtomicU64::new(1),
               next_step_execution_id: AtomicU64::new(1) }
    }
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn create_job_instance(&self, job: Arc<Job>) -> Arc<JobInstance> {
        let id = self.next_instance_id.fetch_add(1, Ordering::SeqCst);
        let instance = Arc::new(JobInstance::new(id, job));
        self.instances.insert(id, instance.clone());
        instance
    }

    fn create_job_execution(&self, instance: &Arc<JobInstance>, parameters: Properties) -> Arc<JobExecution> {
        let id = self.next_execution_id.fetch_add(1, Ordering::SeqCst);
        let execution = Arc::new(JobExecution::new(id, instance.clone(), parameters));
        instance.add_execution(id);
        self.executions.insert(id, execution.clone());
        execution
    }

    fn create_step_execution(&self, step: &Node, execution: &JobExecution) -> Arc<StepExecution> {
        let id = self.next_step_execution_id.fetch_add(1, Ordering::SeqCst);
        let step_execution = Arc::new(StepExecution::new(id,
                                                         execution.execution_id(),
                                                         step.id().to_string(),
                                                         step.index()));
        execution.add_step_execution(id);
        self.step_executions.insert(id, step_execution.clone());
        step_execution
    }

    fn job_instance(&self, instance_id: u64) -> Result<Arc<JobInstance>, RepositoryError> {
        self.instances
            .get(&instance_id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NoSuchJobInstance(instance_id))
    }

    fn job_execution(&self, execution_id: u64) -> Result<Arc<JobExecution>, RepositoryError> {
        self.executions
            .get(&execution_id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NoSuchJobExecution(execution_id))
    }

    fn step_execution(&self, step_execution_id: u64) -> Result<Arc<StepExecution>, RepositoryError> {
        self.step_executions
            .get(&step_execution_id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NoSuchStepExecution(step_execution_id))
    }

    fn job_instances(&self, job_name: &str) -> Vec<Arc<JobInstance>> {
        let mut out: Vec<Arc<JobInstance>> = self.instances
                                                 .iter()
                                                 .filter(|e| e.value().job_name() == job_name)
                                                 .map(|e| e.value().clone())
                                                 .collect();
        out.sort_by_key(|i| i.instance_id());
        out
    }
}

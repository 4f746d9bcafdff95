//! API de control: registrar jobs, arrancarlos, pararlos y consultarlos.
//!
//! `start` vuelve en cuanto el cuerpo del job está encolado en el pool; el
//! resultado se observa con las consultas o con
//! `JobExecution::wait_for_termination`.
use std::sync::Arc;

use dashmap::DashMap;
use log::info;

use crate::artifact::ArtifactFactory;
use crate::config::{EngineConfig, CONFIG};
use crate::engine::{Engine, JobRun};
use crate::errors::OperatorError;
use crate::event::{BatchEvent, BatchEventKind, EventStore, InMemoryEventStore};
use crate::model::{Job, Properties, Scope};
use crate::repo::{BatchStatus, InMemoryJobRepository, JobExecution, JobInstance, JobRepository, StepExecution};
use crate::task::TaskManager;
use crate::transaction::{NoopTransactionManager, TransactionManager};

pub struct JobOperatorBuilder {
    factory: Arc<dyn ArtifactFactory>,
    repository: Option<Arc<dyn JobRepository>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    events: Option<Arc<dyn EventStore>>,
    config: Option<EngineConfig>,
}

impl JobOperatorBuilder {
    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn transactions(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventStore>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<JobOperator, OperatorError> {
        let config = self.config.unwrap_or_else(|| CONFIG.clone());
        let tasks = TaskManager::new(&config).map_err(|e| OperatorError::Configuration(e.to_string()))?;
        let repository = self.repository.unwrap_or_else(|| Arc::new(InMemoryJobRepository::new()));
        let transactions = self.transactions.unwrap_or_else(|| Arc::new(NoopTransactionManager));
        let events = self.events.unwrap_or_else(|| Arc::new(InMemoryEventStore::new()));
        let engine = Engine::new(repository, self.factory, transactions, events, tasks, config);
        Ok(JobOperator { engine: Arc::new(engine),
                         jobs: DashMap::new() })
    }
}

/// Punto de entrada de un host: equivalente al JobOperator de JSR-352.
pub struct JobOperator {
    engine: Arc<Engine>,
    jobs: DashMap<String, Arc<Job>>,
}

impl JobOperator {
    pub fn builder(factory: Arc<dyn ArtifactFactory>) -> JobOperatorBuilder {
        JobOperatorBuilder { factory,
                             repository: None,
                             transactions: None,
                             events: None,
                             config: None }
    }

    /// Operator con repositorio, eventos y transacciones en memoria.
    pub fn new(factory: Arc<dyn ArtifactFactory>) -> Result<Self, OperatorError> {
        Self::builder(factory).build()
    }

    /// Registra (o reemplaza) un job ya construido bajo su id.
    pub fn register_job(&self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        self.jobs.insert(job.id().to_string(), job.clone());
        job
    }

    /// Crea instancia y ejecución y encola el cuerpo del job. Devuelve el id
    /// de la instancia sin esperar a que el job termine.
    pub fn start(&self, job_name: &str, parameters: Properties) -> Result<u64, OperatorError> {
        let job = self.job(job_name)?;
        if job.first_chainable(Scope::Job).is_none() {
            return Err(OperatorError::JobStart { job: job_name.to_string(),
                                                 reason: "job has no step, flow or split to run".into() });
        }
        let repository = &self.engine.repository;
        let instance = repository.create_job_instance(job);
        let execution = repository.create_job_execution(&instance, parameters);
        info!("job '{}': instance {} execution {} submitted",
              job_name,
              instance.instance_id(),
              execution.execution_id());
        JobRun::start(self.engine.clone(), execution);
        Ok(instance.instance_id())
    }

    /// Pide una parada cooperativa de la última ejecución de la instancia.
    pub fn stop(&self, instance_id: u64) -> Result<(), OperatorError> {
        let execution =
            self.latest_execution(instance_id)?.ok_or(OperatorError::JobExecutionNotRunning(instance_id))?;
        let execution_id = execution.execution_id();
        let accepted = execution.update_status(|s| s.is_running().then_some(BatchStatus::Stopping));
        if !accepted {
            return Err(OperatorError::JobExecutionNotRunning(execution_id));
        }
        for step in self.engine.repository.step_executions(execution_id)? {
            step.update_status(|s| {
                    matches!(s, BatchStatus::Starting | BatchStatus::Started).then_some(BatchStatus::Stopping)
                });
        }
        self.engine.emit(execution_id, BatchEventKind::StopRequested);
        let stopped = self.engine.stop_batchlets(execution_id);
        info!("job execution {}: stop requested ({} running batchlets signalled)", execution_id, stopped);
        Ok(())
    }

    pub fn restart(&self, _execution_id: u64, _parameters: Properties) -> Result<u64, OperatorError> {
        Err(OperatorError::Unsupported("restart"))
    }

    pub fn get_job_executions(&self, _instance_id: u64) -> Result<Vec<Arc<JobExecution>>, OperatorError> {
        Err(OperatorError::Unsupported("get_job_executions"))
    }

    pub fn get_job_instance(&self, instance_id: u64) -> Result<Arc<JobInstance>, OperatorError> {
        Ok(self.engine.repository.job_instance(instance_id)?)
    }

    pub fn get_job_execution(&self, execution_id: u64) -> Result<Arc<JobExecution>, OperatorError> {
        Ok(self.engine.repository.job_execution(execution_id)?)
    }

    pub fn get_step_execution(&self,
                              job_execution_id: u64,
                              step_execution_id: u64)
                              -> Result<Arc<StepExecution>, OperatorError> {
        let execution = self.get_job_execution(job_execution_id)?;
        let missing = OperatorError::NoSuchStepExecution { job_execution_id,
                                                           step_execution_id };
        if !execution.step_execution_ids().contains(&step_execution_id) {
            return Err(missing);
        }
        self.engine.repository.step_execution(step_execution_id).map_err(|_| missing)
    }

    pub fn get_step_executions(&self, job_execution_id: u64) -> Result<Vec<Arc<StepExecution>>, OperatorError> {
        Ok(self.engine.repository.step_executions(job_execution_id)?)
    }

    /// Nombres de los jobs registrados, ordenados.
    pub fn get_job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn get_job_instance_ids(&self, job_name: &str) -> Result<Vec<u64>, OperatorError> {
        self.job(job_name)?;
        Ok(self.engine
               .repository
               .job_instances(job_name)
               .iter()
               .map(|i| i.instance_id())
               .collect())
    }

    /// Ids de las ejecuciones del job que aún no han llegado a un estado
    /// terminal.
    pub fn get_running_executions(&self, job_name: &str) -> Result<Vec<u64>, OperatorError> {
        self.job(job_name)?;
        let mut running = Vec::new();
        for instance in self.engine.repository.job_instances(job_name) {
            for id in instance.execution_ids() {
                if self.engine.repository.job_execution(id)?.status().is_running() {
                    running.push(id);
                }
            }
        }
        Ok(running)
    }

    pub fn get_parameters(&self, execution_id: u64) -> Result<Properties, OperatorError> {
        Ok(self.get_job_execution(execution_id)?.parameters().clone())
    }

    /// Última ejecución de la instancia, si existe alguna.
    pub fn latest_execution(&self, instance_id: u64) -> Result<Option<Arc<JobExecution>>, OperatorError> {
        let instance = self.get_job_instance(instance_id)?;
        match instance.execution_ids().last() {
            Some(id) => Ok(Some(self.get_job_execution(*id)?)),
            None => Ok(None),
        }
    }

    pub fn events(&self, execution_id: u64) -> Vec<BatchEvent> {
        self.engine.events.list(execution_id)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn job(&self, job_name: &str) -> Result<Arc<Job>, OperatorError> {
        self.jobs
            .get(job_name)
            .map(|j| j.value().clone())
            .ok_or_else(|| OperatorError::NoSuchJob(job_name.to_string()))
    }
}

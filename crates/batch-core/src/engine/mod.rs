//! Motor de ejecución.
//!
//! - `run`: cuerpo del job (listeners, finalización, estado terminal).
//! - `walker`: recorrido del grafo, un caso por tipo de nodo.
//! - `step`: ciclo de vida común de un step (execution, listeners, artifacts).
//! - `batchlet`, `chunk`, `partition`, `decision`: cuerpos por tipo.
//!
//! Los fallos de un nodo se capturan en su propio borde, se loguean y pasan a
//! estado FAILED; nunca salen de la tarea que los ejecuta.

pub mod batchlet;
pub mod chunk;
pub mod decision;
pub mod partition;
pub mod run;
pub mod step;
pub mod walker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::warn;

use crate::artifact::{ArtifactFactory, SharedBatchlet};
use crate::config::EngineConfig;
use crate::event::{BatchEventKind, EventStore};
use crate::repo::{BatchStatus, JobRepository, StepExecution};
use crate::task::TaskManager;
use crate::transaction::TransactionManager;

pub use run::JobRun;

struct RunningBatchlet {
    job_execution_id: u64,
    step_execution: Arc<StepExecution>,
    batchlet: SharedBatchlet,
}

/// Estado compartido por todas las ejecuciones de un operator.
pub struct Engine {
    pub(crate) repository: Arc<dyn JobRepository>,
    pub(crate) factory: Arc<dyn ArtifactFactory>,
    pub(crate) transactions: Arc<dyn TransactionManager>,
    pub(crate) events: Arc<dyn EventStore>,
    pub(crate) tasks: TaskManager,
    pub(crate) config: EngineConfig,
    running: DashMap<u64, RunningBatchlet>,
    next_token: AtomicU64,
}

impl Engine {
    pub(crate) fn new(repository: Arc<dyn JobRepository>,
                      factory: Arc<dyn ArtifactFactory>,
                      transactions: Arc<dyn TransactionManager>,
                      events: Arc<dyn EventStore>,
                      tasks: TaskManager,
                      config: EngineConfig)
                      -> Self {
        Self { repository,
               factory,
               transactions,
               events,
               tasks,
               config,
               running: DashMap::new(),
               next_token: AtomicU64::new(0) }
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    pub fn events(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn emit(&self, execution_id: u64, kind: BatchEventKind) {
        self.events.append_kind(execution_id, kind);
    }

    /// Registra un batchlet como "en ejecución" mientras viva el guard.
    pub(crate) fn register_batchlet(&self,
                                    job_execution_id: u64,
                                    step_execution: Arc<StepExecution>,
                                    batchlet: SharedBatchlet)
                                    -> RunningGuard<'_> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.running.insert(token,
                            RunningBatchlet { job_execution_id,
                                              step_execution,
                                              batchlet });
        RunningGuard { engine: self,
                       token }
    }

    /// Pide `stop()` a cada batchlet en ejecución de la ejecución dada y
    /// marca su step como STOPPED. Devuelve cuántos se pararon.
    pub(crate) fn stop_batchlets(&self, job_execution_id: u64) -> usize {
        // copiar fuera del mapa: stop() puede tardar y no debe bloquear shards
        let targets: Vec<(Arc<StepExecution>, SharedBatchlet)> =
            self.running
                .iter()
                .filter(|e| e.value().job_execution_id == job_execution_id)
                .map(|e| (e.value().step_execution.clone(), e.value().batchlet.clone()))
                .collect();
        for (step, batchlet) in &targets {
            if let Err(e) = batchlet.stop() {
                warn!("stop() of batchlet in step '{}' failed: {}", step.step_name(), e);
            }
            step.set_status(BatchStatus::Stopped);
        }
        targets.len()
    }

    pub(crate) fn running_batchlets(&self, job_execution_id: u64) -> usize {
        self.running.iter().filter(|e| e.value().job_execution_id == job_execution_id).count()
    }
}

/// Saca el batchlet del registro al salir de su ámbito.
pub(crate) struct RunningGuard<'a> {
    engine: &'a Engine,
    token: u64,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.engine.running.remove(&self.token);
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::repo::BatchStatus;

/// Evento de una ejecución de job. `seq` es monótono por ejecución.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEvent {
    pub seq: u64,
    pub execution_id: u64,
    pub kind: BatchEventKind,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum BatchEventKind {
    JobStarted {
        job_name: String,
        definition_hash: String,
    },
    JobFinished {
        status: BatchStatus,
        exit_status: String,
    },
    StepStarted {
        step: String,
        step_execution_id: u64,
    },
    StepFinished {
        step: String,
        step_execution_id: u64,
        status: BatchStatus,
        exit_status: String,
    },
    ChunkCommitted {
        step: String,
        partition: Option<usize>,
        items: u64,
    },
    ChunkRolledBack {
        step: String,
        partition: Option<usize>,
        retry: i64,
        error: String,
    },
    PartitionFinished {
        step: String,
        index: usize,
        status: BatchStatus,
        exit_status: String,
    },
    DecisionMade {
        decision: String,
        exit_status: String,
        transition: Option<String>,
    },
    StopRequested,
}

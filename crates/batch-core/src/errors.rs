//! Errores del core.
//!
//! Se separan por frontera: construcción del grafo (`GraphBuildError`),
//! resolución/creación de artifacts (`ArtifactError`), fallos durante la
//! ejecución (`BatchError`, nunca cruza hacia el operator), repositorio y API
//! del operator.

use thiserror::Error;

use crate::artifact::Capability;

/// Grafo de job mal formado. Se devuelve de forma síncrona desde el builder.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GraphBuildError {
    #[error("duplicate id '{id}' in container '{container}'")]
    DuplicateId { id: String, container: String },
    #[error("node '{0}' is already attached to a container")]
    AlreadyAttached(String),
    #[error("unknown node index {0}")]
    UnknownNode(usize),
    #[error("node '{0}' cannot contain other nodes")]
    NotAContainer(String),
    #[error("attaching '{0}' would make it its own ancestor")]
    Cycle(String),
    #[error("split '{id}' must contain at least 2 flows, found {found}")]
    SplitTooSmall { id: String, found: usize },
    #[error("split '{split}' may only contain flows; '{child}' is not a flow")]
    SplitChildNotFlow { split: String, child: String },
    #[error("invalid parameter '{name}' on '{node}': {reason}")]
    InvalidParameter { node: String, name: String, reason: String },
    #[error("'{from}' names unknown next element '{to}'")]
    UnresolvedNext { from: String, to: String },
    #[error("node '{0}' is not attached to any container")]
    Orphan(String),
    #[error("missing required artifact '{what}' on '{node}'")]
    MissingArtifact { node: String, what: String },
    #[error("job definition could not be serialized: {0}")]
    Serialization(String),
}

/// Fallos de resolución o materialización de artifacts.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ArtifactError {
    #[error("artifact '{0}' not found")]
    NotFound(String),
    #[error("artifact '{reference}' could not be created: {reason}")]
    Creation { reference: String, reason: String },
    #[error("artifact '{reference}' does not provide capability {expected} (got {actual})")]
    CapabilityMismatch { reference: String, expected: Capability, actual: Capability },
    #[error("artifact '{reference}' could not be destroyed: {reason}")]
    Destroy { reference: String, reason: String },
}

/// Errores producidos durante la ejecución de un job (artifacts o motor).
///
/// Se capturan en la frontera de cada nodo y se traducen a estado FAILED.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BatchError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("item error: {0}")]
    Item(String),
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("partition {index} failed: {reason}")]
    Partition { index: usize, reason: String },
    #[error("panic in batch task: {0}")]
    Panicked(String),
    #[error("retry limit {limit} exceeded: {last}")]
    RetryLimitExceeded { limit: i64, last: String },
    #[error("worker pool error: {0}")]
    Pool(String),
    #[error("{0}")]
    Other(String),
}

impl BatchError {
    pub fn item(msg: impl Into<String>) -> Self {
        Self::Item(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Búsquedas fallidas en el repositorio de ejecuciones.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RepositoryError {
    #[error("no such job instance {0}")]
    NoSuchJobInstance(u64),
    #[error("no such job execution {0}")]
    NoSuchJobExecution(u64),
    #[error("no such step execution {0}")]
    NoSuchStepExecution(u64),
}

/// Errores visibles para quien llama a la API del operator.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum OperatorError {
    #[error("no such job '{0}'")]
    NoSuchJob(String),
    #[error("no such job instance {0}")]
    NoSuchJobInstance(u64),
    #[error("no such job execution {0}")]
    NoSuchJobExecution(u64),
    #[error("no such step execution {step_execution_id} in job execution {job_execution_id}")]
    NoSuchStepExecution { job_execution_id: u64, step_execution_id: u64 },
    #[error("job '{job}' cannot start: {reason}")]
    JobStart { job: String, reason: String },
    #[error("job execution {0} is not running")]
    JobExecutionNotRunning(u64),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("engine configuration error: {0}")]
    Configuration(String),
}

impl From<RepositoryError> for OperatorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NoSuchJobInstance(id) => Self::NoSuchJobInstance(id),
            RepositoryError::NoSuchJobExecution(id) => Self::NoSuchJobExecution(id),
            RepositoryError::NoSuchStepExecution(id) => {
                Self::NoSuchStepExecution { job_execution_id: 0,
                                            step_execution_id: id }
            }
        }
    }
}

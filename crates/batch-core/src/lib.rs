//! batch-core: motor de ejecución de jobs batch (chunks, batchlets,
//! particiones, splits y decisiones) con repositorio en memoria.
pub mod artifact;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod operator;
pub mod repo;
pub mod task;
pub mod transaction;

pub use artifact::{ArtifactFactory, ArtifactInstance, ArtifactRequest, RegistryArtifactFactory};
pub use config::{EngineConfig, CONFIG};
pub use context::{JobContext, StepContext};
pub use errors::{ArtifactError, BatchError, GraphBuildError, OperatorError, RepositoryError};
pub use event::{BatchEvent, BatchEventKind, EventStore, InMemoryEventStore};
pub use model::{
    ArtifactRef, BatchletStep, CheckpointPolicy, ChunkStep, Decision, Job, JobBuilder, NodeId, PartitionConfig,
    PartitionPlan, Properties, Scope, Transition,
};
pub use operator::{JobOperator, JobOperatorBuilder};
pub use repo::{BatchStatus, InMemoryJobRepository, JobExecution, JobInstance, JobRepository, StepExecution};

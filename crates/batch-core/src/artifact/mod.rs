//! Artifacts: contratos por capacidad, factory pluggable y contenedor con
//! ciclo de vida por ámbito.

pub mod capability;
pub mod container;
pub mod factory;
pub mod instance;

pub use capability::{
    Batchlet, CheckpointAlgorithm, ChunkListener, Decider, ItemProcessor, ItemReader, ItemWriter, JobListener,
    Listener, PartitionAnalyzer, PartitionCollector, PartitionMapper, PartitionReducer, PartitionStatus, StepListener,
};
pub use container::ArtifactContainer;
pub use factory::{ArtifactFactory, ArtifactRequest, RegistryArtifactFactory};
pub use instance::{
    ArtifactInstance, Capability, Capable, SharedAnalyzer, SharedBatchlet, SharedCheckpointAlgorithm, SharedCollector,
    SharedDecider, SharedListener, SharedMapper, SharedProcessor, SharedReader, SharedReducer, SharedWriter,
};

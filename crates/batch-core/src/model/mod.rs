//! Modelo del grafo de job.
//!
//! Un `Job` es un arena de nodos (`Node`) con contenedores que indexan a sus
//! hijos por id. La pertenencia se expresa como "el contenedor posee la lista
//! de hijos"; la referencia inversa al contenedor es un `Scope` (índice plano),
//! no un puntero. El grafo es inmutable una vez construido con `JobBuilder`.

pub mod artifact_ref;
pub mod builder;
pub mod decision;
pub mod job;
pub mod node;
pub mod partition;
pub mod step;

pub use artifact_ref::{ArtifactRef, Properties};
pub use builder::JobBuilder;
pub use decision::{Decision, Transition};
pub use job::Job;
pub use node::{Container, Node, NodeId, NodeKind, Scope};
pub use partition::{PartitionConfig, PartitionPlan, PartitionSource};
pub use step::{BatchletStep, CheckpointPolicy, ChunkStep};

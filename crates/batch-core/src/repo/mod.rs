//! Repositorio de ejecuciones: instancias de job, ejecuciones de job y de
//! step, con ids monótonos.

pub mod memory;
pub mod status;
pub mod types;

pub use memory::{InMemoryJobRepository, JobRepository};
pub use status::BatchStatus;
pub use types::{JobExecution, JobInstance, MetricsSnapshot, StepExecution, StepMetrics};

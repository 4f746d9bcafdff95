//! Contextos de ejecución visibles para los artifacts.
//!
//! No hay estado thread-local: el motor construye un `JobContext` por
//! ejecución (y uno nuevo por flow de split y por partición) y un
//! `StepContext` por step o partición, y los pasa explícitamente hacia abajo.
//! Los artifacts los reciben al crearse, vía `ArtifactRequest`.

pub mod job;
pub mod step;

pub use job::JobContext;
pub use step::StepContext;

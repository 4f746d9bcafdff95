//! batchflow
//!
//! Fachada del workspace:
//! - Re-exporta `batch_core` (motor, modelo, operator).
//! - Expone `samples` con artifacts y jobs de ejemplo que usan el CLI y los
//!   tests end-to-end.

pub use batch_core::*;

pub mod samples;

//! Eventos de ejecución (append-only).

pub mod store;
pub mod types;

pub use store::{EventStore, InMemoryEventStore};
pub use types::{BatchEvent, BatchEventKind};

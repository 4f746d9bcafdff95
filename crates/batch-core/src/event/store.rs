use chrono::Utc;
use dashmap::DashMap;

use super::{BatchEvent, BatchEventKind};

/// Almacenamiento de eventos append-only, compartido entre workers.
pub trait EventStore: Send + Sync {
    /// Agrega un evento a partir de su kind y devuelve el evento completo (con seq y ts).
    fn append_kind(&self, execution_id: u64, kind: BatchEventKind) -> BatchEvent;
    /// Lista eventos de una ejecución (orden ascendente por seq).
    fn list(&self, execution_id: u64) -> Vec<BatchEvent>;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: DashMap<u64, Vec<BatchEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&self, execution_id: u64, kind: BatchEventKind) -> BatchEvent {
        let mut events = self.inner.entry(execution_id).or_default();
        let ev = BatchEvent { seq: events.len() as u64,
                              execution_id,
                              kind,
                              ts: Utc::now() };
        events.push(ev.clone());
        ev
    }

    fn list(&self, execution_id: u64) -> Vec<BatchEvent> {
        self.inner.get(&execution_id).map(|e| e.value().clone()).unwrap_or_default()
    }
}

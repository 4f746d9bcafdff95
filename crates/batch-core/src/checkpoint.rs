//! Algoritmos de checkpoint integrados (ITEM y TIME). La política CUSTOM
//! usa un artifact `CheckpointAlgorithm` provisto por la aplicación.
use std::time::{Duration, Instant};

use crate::artifact::CheckpointAlgorithm;
use crate::errors::BatchError;

/// Checkpoint cada `interval` items procesados.
#[derive(Debug, Clone)]
pub struct ItemCheckpointAlgorithm {
    interval: u32,
    count: u32,
}

impl ItemCheckpointAlgorithm {
    pub fn new(interval: u32) -> Self {
        Self { interval: interval.max(1),
               count: 0 }
    }
}

impl CheckpointAlgorithm for ItemCheckpointAlgorithm {
    fn begin_checkpoint(&mut self) -> Result<(), BatchError> {
        self.count = 0;
        Ok(())
    }

    fn is_ready_to_checkpoint(&mut self) -> Result<bool, BatchError> {
        self.count += 1;
        Ok(self.count >= self.interval)
    }

    fn end_checkpoint(&mut self) -> Result<(), BatchError> {
        self.count = 0;
        Ok(())
    }
}

/// Checkpoint cuando pasó `interval` de reloj desde el inicio del intervalo.
#[derive(Debug, Clone)]
pub struct TimeCheckpointAlgorithm {
    interval: Duration,
    started: Instant,
}

impl TimeCheckpointAlgorithm {
    pub fn new(interval: Duration) -> Self {
        Self { interval,
               started: Instant::now() }
    }

    pub fn from_secs(secs: u32) -> Self {
        Self::new(Duration::from_secs(u64::from(secs)))
    }
}

impl CheckpointAlgorithm for TimeCheckpointAlgorithm {
    fn begin_checkpoint(&mut self) -> Result<(), BatchError> {
        self.started = Instant::now();
        Ok(())
    }

    fn is_ready_to_checkpoint(&mut self) -> Result<bool, BatchError> {
        Ok(self.started.elapsed() >= self.interval)
    }
}

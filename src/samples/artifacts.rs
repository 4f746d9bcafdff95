//! Artifacts de ejemplo sobre rangos de enteros.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use batch_core::artifact::{
    Batchlet, ChunkListener, ItemProcessor, ItemReader, ItemWriter, JobListener, Listener, PartitionMapper,
    StepListener,
};
use batch_core::{BatchError, PartitionPlan, Properties};
use log::info;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Lee los enteros `start..=end`. El checkpoint es el siguiente a leer.
#[derive(Debug)]
pub struct NumberReader {
    start: i64,
    end: i64,
    next: i64,
}

impl NumberReader {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start,
               end,
               next: start }
    }
}

impl ItemReader for NumberReader {
    fn open(&mut self, checkpoint: Option<&Value>) -> Result<(), BatchError> {
        self.next = match checkpoint {
            Some(cp) => cp.as_i64().ok_or_else(|| BatchError::item(format!("bad reader checkpoint {}", cp)))?,
            None => self.start,
        };
        Ok(())
    }

    fn read_item(&mut self) -> Result<Option<Value>, BatchError> {
        if self.next > self.end {
            return Ok(None);
        }
        let item = self.next;
        self.next += 1;
        Ok(Some(json!(item)))
    }

    fn checkpoint_info(&self) -> Result<Option<Value>, BatchError> {
        Ok(Some(json!(self.next)))
    }
}

/// Eleva al cuadrado; filtra los múltiplos de `skip_multiples_of` si se fija.
#[derive(Debug, Default)]
pub struct SquareProcessor {
    pub skip_multiples_of: Option<i64>,
}

impl ItemProcessor for SquareProcessor {
    fn process_item(&mut self, item: Value) -> Result<Option<Value>, BatchError> {
        let n = item.as_i64().ok_or_else(|| BatchError::item(format!("not an integer: {}", item)))?;
        if matches!(self.skip_multiples_of, Some(m) if m != 0 && n % m == 0) {
            return Ok(None);
        }
        n.checked_mul(n)
         .map(|sq| Some(json!(sq)))
         .ok_or_else(|| BatchError::item(format!("{} squared overflows", n)))
    }
}

/// Acumula items en una lista compartida.
///
/// El checkpoint es cuántos items escribió esta instancia; al reabrir tras
/// un rollback descarta lo escrito después de ese punto.
#[derive(Debug)]
pub struct CollectingWriter {
    sink: Arc<Mutex<Vec<Value>>>,
    base: Option<usize>,
}

impl CollectingWriter {
    pub fn new(sink: Arc<Mutex<Vec<Value>>>) -> Self {
        Self { sink,
               base: None }
    }
}

impl ItemWriter for CollectingWriter {
    fn open(&mut self, checkpoint: Option<&Value>) -> Result<(), BatchError> {
        let mut sink = self.sink.lock();
        let base = *self.base.get_or_insert(sink.len());
        let committed = checkpoint.and_then(Value::as_u64).unwrap_or(0) as usize;
        sink.truncate(base + committed);
        Ok(())
    }

    fn write_items(&mut self, items: &[Value]) -> Result<(), BatchError> {
        self.sink.lock().extend_from_slice(items);
        Ok(())
    }

    fn checkpoint_info(&self) -> Result<Option<Value>, BatchError> {
        let written = self.sink.lock().len().saturating_sub(self.base.unwrap_or(0));
        Ok(Some(json!(written)))
    }
}

/// Duerme `duration` en tramos cortos; `stop()` lo corta en el siguiente.
#[derive(Debug)]
pub struct NapBatchlet {
    duration: Duration,
    stopped: AtomicBool,
}

impl NapBatchlet {
    pub fn new(duration: Duration) -> Self {
        Self { duration,
               stopped: AtomicBool::new(false) }
    }
}

impl Batchlet for NapBatchlet {
    fn process(&self) -> Result<String, BatchError> {
        let deadline = Instant::now() + self.duration;
        while Instant::now() < deadline {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok("WOKEN".into());
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok("RESTED".into())
    }

    fn stop(&self) -> Result<(), BatchError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Reparte `start..=end` en `partitions` tramos contiguos (propiedades
/// `start`/`end` por partición).
#[derive(Debug)]
pub struct RangeMapper {
    pub start: i64,
    pub end: i64,
    pub partitions: usize,
    pub threads: Option<usize>,
}

impl PartitionMapper for RangeMapper {
    fn map_partitions(&self) -> Result<PartitionPlan, BatchError> {
        if self.partitions == 0 || self.end < self.start {
            return Err(BatchError::other(format!("cannot split {}..={} in {} partitions",
                                                 self.start, self.end, self.partitions)));
        }
        let total = (self.end - self.start + 1) as usize;
        let per = total.div_ceil(self.partitions);
        let properties = (0..self.partitions).map(|i| {
                                                 let lo = self.start + (i * per) as i64;
                                                 let hi = (lo + per as i64 - 1).min(self.end);
                                                 let mut p = Properties::new();
                                                 p.insert("start".into(), lo.to_string());
                                                 p.insert("end".into(), hi.to_string());
                                                 p
                                             })
                                             .collect();
        let mut plan = PartitionPlan::new(self.partitions).with_partition_properties(properties);
        if let Some(t) = self.threads {
            plan = plan.threads(t);
        }
        Ok(plan)
    }
}

/// Loguea cada callback de job, step y chunk.
#[derive(Debug, Default)]
pub struct LoggingListener {
    pub name: String,
}

impl JobListener for LoggingListener {
    fn before_job(&self) -> Result<(), BatchError> {
        info!("[{}] before job", self.name);
        Ok(())
    }

    fn after_job(&self) -> Result<(), BatchError> {
        info!("[{}] after job", self.name);
        Ok(())
    }
}

impl StepListener for LoggingListener {
    fn before_step(&self) -> Result<(), BatchError> {
        info!("[{}] before step", self.name);
        Ok(())
    }

    fn after_step(&self) -> Result<(), BatchError> {
        info!("[{}] after step", self.name);
        Ok(())
    }
}

impl ChunkListener for LoggingListener {
    fn after_chunk(&self) -> Result<(), BatchError> {
        info!("[{}] chunk committed", self.name);
        Ok(())
    }

    fn on_chunk_error(&self, error: &BatchError) -> Result<(), BatchError> {
        info!("[{}] chunk failed: {}", self.name, error);
        Ok(())
    }
}

impl Listener for LoggingListener {
    fn as_job_listener(&self) -> Option<&dyn JobListener> {
        Some(self)
    }

    fn as_step_listener(&self) -> Option<&dyn StepListener> {
        Some(self)
    }

    fn as_chunk_listener(&self) -> Option<&dyn ChunkListener> {
        Some(self)
    }
}

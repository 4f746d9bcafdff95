//! Bucle de chunks: read -> process -> buffer -> write, con checkpoints,
//! transacciones por intervalo y retry desde el último checkpoint.
//!
//! Un intento abre reader y writer con el último checkpoint confirmado,
//! procesa intervalos hasta fin de datos y cierra writer y luego reader pase
//! lo que pase. Si un intervalo falla se hace rollback de su transacción y,
//! mientras el límite de retry lo permita, se vuelve a intentar desde ese
//! checkpoint (no desde el principio del step).
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::artifact::{
    ArtifactContainer, CheckpointAlgorithm, SharedCheckpointAlgorithm, SharedListener, SharedProcessor,
    SharedReader, SharedWriter,
};
use crate::checkpoint::{ItemCheckpointAlgorithm, TimeCheckpointAlgorithm};
use crate::constants::UNLIMITED;
use crate::context::{JobContext, StepContext};
use crate::errors::BatchError;
use crate::event::BatchEventKind;
use crate::model::{CheckpointPolicy, ChunkStep};
use crate::repo::{BatchStatus, StepMetrics};
use crate::transaction::Transaction;

use super::Engine;

pub(crate) fn run_chunk(engine: &Engine,
                        step: &ChunkStep,
                        job_ctx: &JobContext,
                        step_ctx: &StepContext,
                        container: &mut ArtifactContainer)
                        -> Result<BatchStatus, BatchError> {
    let reader: SharedReader = container.create(&step.reader, job_ctx, Some(step_ctx))?;
    let processor: Option<SharedProcessor> = match &step.processor {
        Some(p) => Some(container.create(p, job_ctx, Some(step_ctx))?),
        None => None,
    };
    let writer: SharedWriter = container.create(&step.writer, job_ctx, Some(step_ctx))?;
    let algorithm: SharedCheckpointAlgorithm = match &step.checkpoint_policy {
        CheckpointPolicy::Item => builtin(ItemCheckpointAlgorithm::new(step.commit_interval)),
        CheckpointPolicy::Time => builtin(TimeCheckpointAlgorithm::from_secs(step.commit_interval)),
        CheckpointPolicy::Custom(artifact) => container.create(artifact, job_ctx, Some(step_ctx))?,
    };
    let listeners = container.created::<SharedListener>()
                             .into_iter()
                             .filter(|l| l.as_chunk_listener().is_some())
                             .collect();

    let mut chunk = ChunkLoop { engine,
                                step,
                                step_ctx,
                                reader,
                                processor,
                                writer,
                                algorithm,
                                listeners,
                                buffer_size: step.effective_buffer_size(engine.config.default_buffer_size),
                                checkpoint: (None, None),
                                skips: 0,
                                committed_skips: 0 };
    chunk.execute()
}

fn builtin(algorithm: impl CheckpointAlgorithm + 'static) -> SharedCheckpointAlgorithm {
    Arc::new(Mutex::new(algorithm))
}

struct ChunkLoop<'a> {
    engine: &'a Engine,
    step: &'a ChunkStep,
    step_ctx: &'a StepContext,
    reader: SharedReader,
    processor: Option<SharedProcessor>,
    writer: SharedWriter,
    algorithm: SharedCheckpointAlgorithm,
    listeners: Vec<SharedListener>,
    /// 0 = escribir cada item en cuanto sale del processor.
    buffer_size: usize,
    /// Último checkpoint confirmado (reader, writer).
    checkpoint: (Option<Value>, Option<Value>),
    skips: i64,
    /// Skips hasta el último commit; un intervalo deshecho vuelve a este valor.
    committed_skips: i64,
}

impl ChunkLoop<'_> {
    fn execute(&mut self) -> Result<BatchStatus, BatchError> {
        let mut retries: i64 = 0;
        loop {
            if self.step_ctx.is_stop_requested() {
                return Ok(BatchStatus::Stopped);
            }
            match self.attempt() {
                Ok(status) => return Ok(status),
                Err(e) => {
                    // los items saltados del intervalo deshecho se vuelven a leer
                    self.skips = self.committed_skips;
                    self.counters().add_rollback();
                    self.step_ctx.record_error(e.to_string());
                    self.engine.emit(self.execution_id(),
                                     BatchEventKind::ChunkRolledBack { step: self.step_ctx.step_name().to_string(),
                                                                       partition: self.step_ctx.partition(),
                                                                       retry: retries,
                                                                       error: e.to_string() });
                    if self.step.retry_limit != UNLIMITED && retries >= self.step.retry_limit {
                        return Err(BatchError::RetryLimitExceeded { limit: self.step.retry_limit,
                                                                    last: e.to_string() });
                    }
                    retries += 1;
                    warn!("step '{}': chunk failed ({}), retry {} from last checkpoint",
                          self.step_ctx.step_name(),
                          e,
                          retries);
                }
            }
        }
    }

    fn attempt(&mut self) -> Result<BatchStatus, BatchError> {
        let (reader_cp, writer_cp) = self.checkpoint.clone();
        let opened = self.reader.lock().open(reader_cp.as_ref());
        opened?;
        let opened = self.writer.lock().open(writer_cp.as_ref());
        let result = match opened {
            Ok(()) => {
                let body = self.transactional();
                let closed = self.writer.lock().close();
                body.and_then(|status| closed.map(|_| status))
            }
            Err(e) => Err(e),
        };
        let closed = self.reader.lock().close();
        result.and_then(|status| closed.map(|_| status))
    }

    fn transactional(&mut self) -> Result<BatchStatus, BatchError> {
        let mut tx = Some(self.engine.transactions.begin()?);
        let result = self.intervals(&mut tx);
        if let Err(e) = &result {
            for listener in &self.listeners {
                if let Some(l) = listener.as_chunk_listener() {
                    if let Err(le) = l.on_chunk_error(e) {
                        warn!("chunk listener on_chunk_error failed: {}", le);
                    }
                }
            }
            if let Some(tx) = tx.take() {
                if let Err(re) = tx.rollback() {
                    warn!("step '{}': rollback failed: {}", self.step_ctx.step_name(), re);
                }
            }
        }
        result
    }

    fn intervals(&mut self, tx: &mut Option<Box<dyn Transaction>>) -> Result<BatchStatus, BatchError> {
        let flush_at = self.buffer_size.max(1);
        let mut buffer: Vec<Value> = Vec::with_capacity(flush_at);
        let mut items: u64 = 0;
        self.begin_interval()?;
        loop {
            let read = self.reader.lock().read_item();
            let Some(item) = read? else {
                break;
            };
            self.counters().add_read(1);
            if let Some(out) = self.process(item)? {
                buffer.push(out);
                if buffer.len() >= flush_at {
                    self.flush(&mut buffer)?;
                }
            }
            items += 1;

            let ready = self.algorithm.lock().is_ready_to_checkpoint();
            if ready? {
                self.flush(&mut buffer)?;
                self.commit(tx, items)?;
                items = 0;
                if self.step_ctx.is_stop_requested() {
                    debug!("step '{}': stopping at checkpoint boundary", self.step_ctx.step_name());
                    return Ok(BatchStatus::Stopped);
                }
                *tx = Some(self.engine.transactions.begin()?);
                self.begin_interval()?;
            }
        }
        self.flush(&mut buffer)?;
        self.commit(tx, items)?;
        Ok(BatchStatus::Completed)
    }

    fn begin_interval(&mut self) -> Result<(), BatchError> {
        let begun = self.algorithm.lock().begin_checkpoint();
        begun?;
        for listener in &self.listeners {
            if let Some(l) = listener.as_chunk_listener() {
                l.before_chunk()?;
            }
        }
        Ok(())
    }

    /// Pasa un item por el processor. `None` si se filtró o se saltó.
    fn process(&mut self, item: Value) -> Result<Option<Value>, BatchError> {
        let Some(processor) = &self.processor else {
            return Ok(Some(item));
        };
        let processed = processor.lock().process_item(item);
        match processed {
            Ok(Some(out)) => Ok(Some(out)),
            Ok(None) => {
                self.counters().add_filter();
                Ok(None)
            }
            Err(e) if self.can_skip() => {
                self.skips += 1;
                self.counters().add_process_skip();
                warn!("step '{}': skipping item ({}/{}): {}",
                      self.step_ctx.step_name(),
                      self.skips,
                      self.step.skip_limit,
                      e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn can_skip(&self) -> bool {
        self.step.skip_limit == UNLIMITED || self.skips < self.step.skip_limit
    }

    fn flush(&mut self, buffer: &mut Vec<Value>) -> Result<(), BatchError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let written = self.writer.lock().write_items(buffer);
        written?;
        self.counters().add_write(buffer.len() as u64);
        buffer.clear();
        Ok(())
    }

    /// Cierra el intervalo: snapshot de checkpoints, commit y avisos.
    fn commit(&mut self, tx: &mut Option<Box<dyn Transaction>>, items: u64) -> Result<(), BatchError> {
        let reader_cp = self.reader.lock().checkpoint_info();
        let reader_cp = reader_cp?;
        let writer_cp = self.writer.lock().checkpoint_info();
        let writer_cp = writer_cp?;
        let ended = self.algorithm.lock().end_checkpoint();
        ended?;
        if let Some(tx) = tx.take() {
            tx.commit()?;
        }
        if self.step_ctx.partition().is_none() {
            self.step_ctx.execution().set_checkpoints(reader_cp.clone(), writer_cp.clone());
        }
        self.checkpoint = (reader_cp, writer_cp);
        self.committed_skips = self.skips;
        self.counters().add_commit();
        self.engine.emit(self.execution_id(),
                         BatchEventKind::ChunkCommitted { step: self.step_ctx.step_name().to_string(),
                                                          partition: self.step_ctx.partition(),
                                                          items });
        for listener in &self.listeners {
            if let Some(l) = listener.as_chunk_listener() {
                l.after_chunk()?;
            }
        }
        Ok(())
    }

    fn counters(&self) -> &StepMetrics {
        self.step_ctx.execution().counters()
    }

    fn execution_id(&self) -> u64 {
        self.step_ctx.job_execution().execution_id()
    }
}

//! Contratos que implementan los artifacts.
//!
//! Los items y los datos de checkpoint viajan como `serde_json::Value`: el
//! motor no interpreta ninguno de los dos, sólo los mueve entre reader,
//! processor y writer y los guarda en la step execution.
//!
//! Reader, processor, writer y algoritmo de checkpoint se usan desde un único
//! hilo a la vez y reciben `&mut self`. El resto se invoca con `&self` y debe
//! ser `Sync`: un batchlet, por ejemplo, recibe `stop()` desde el hilo del
//! operator mientras `process()` corre en un worker.
use std::sync::Arc;

use serde_json::Value;

use crate::errors::BatchError;
use crate::model::PartitionPlan;
use crate::repo::{BatchStatus, StepExecution};

pub trait ItemReader: Send {
    /// `checkpoint` es el último dato confirmado por `checkpoint_info`, o
    /// `None` en el primer intento.
    fn open(&mut self, checkpoint: Option<&Value>) -> Result<(), BatchError>;
    /// `None` marca fin de datos.
    fn read_item(&mut self) -> Result<Option<Value>, BatchError>;
    fn checkpoint_info(&self) -> Result<Option<Value>, BatchError> {
        Ok(None)
    }
    fn close(&mut self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait ItemProcessor: Send {
    /// `Ok(None)` filtra el item: no llega al writer.
    fn process_item(&mut self, item: Value) -> Result<Option<Value>, BatchError>;
}

pub trait ItemWriter: Send {
    fn open(&mut self, checkpoint: Option<&Value>) -> Result<(), BatchError>;
    fn write_items(&mut self, items: &[Value]) -> Result<(), BatchError>;
    fn checkpoint_info(&self) -> Result<Option<Value>, BatchError> {
        Ok(None)
    }
    fn close(&mut self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait Batchlet: Send + Sync {
    /// Devuelve el exit status del step.
    fn process(&self) -> Result<String, BatchError>;
    /// Petición de parada cooperativa. Puede llegar en cualquier momento
    /// durante `process()`.
    fn stop(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Decide cuándo cerrar un intervalo de checkpoint.
pub trait CheckpointAlgorithm: Send {
    fn begin_checkpoint(&mut self) -> Result<(), BatchError> {
        Ok(())
    }
    /// Se consulta tras cada item procesado.
    fn is_ready_to_checkpoint(&mut self) -> Result<bool, BatchError>;
    fn end_checkpoint(&mut self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait JobListener: Send + Sync {
    fn before_job(&self) -> Result<(), BatchError> {
        Ok(())
    }
    fn after_job(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait StepListener: Send + Sync {
    fn before_step(&self) -> Result<(), BatchError> {
        Ok(())
    }
    fn after_step(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait ChunkListener: Send + Sync {
    fn before_chunk(&self) -> Result<(), BatchError> {
        Ok(())
    }
    fn after_chunk(&self) -> Result<(), BatchError> {
        Ok(())
    }
    /// Notificación antes del rollback de un chunk fallido.
    fn on_chunk_error(&self, _error: &BatchError) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Artifact listener: un mismo objeto puede escuchar job, step y chunks.
/// El motor pregunta por cada faceta y sólo llama a las que existen.
pub trait Listener: Send + Sync {
    fn as_job_listener(&self) -> Option<&dyn JobListener> {
        None
    }
    fn as_step_listener(&self) -> Option<&dyn StepListener> {
        None
    }
    fn as_chunk_listener(&self) -> Option<&dyn ChunkListener> {
        None
    }
}

pub trait PartitionMapper: Send + Sync {
    fn map_partitions(&self) -> Result<PartitionPlan, BatchError>;
}

/// Resultado del step particionado que se comunica al reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    Commit,
    Rollback,
}

pub trait PartitionReducer: Send + Sync {
    fn begin_partitioned_step(&self) -> Result<(), BatchError> {
        Ok(())
    }
    fn before_partitioned_step_completion(&self) -> Result<(), BatchError> {
        Ok(())
    }
    fn rollback_partitioned_step(&self) -> Result<(), BatchError> {
        Ok(())
    }
    fn after_partitioned_step_completion(&self, _status: PartitionStatus) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Corre en el hilo de cada partición; lo que devuelve llega al analyzer.
pub trait PartitionCollector: Send + Sync {
    fn collect_partition_data(&self) -> Result<Option<Value>, BatchError>;
}

/// Corre en el hilo del step, una vez por partición terminada.
pub trait PartitionAnalyzer: Send + Sync {
    fn analyze_collector_data(&self, _data: &Value) -> Result<(), BatchError> {
        Ok(())
    }
    fn analyze_status(&self, _status: BatchStatus, _exit_status: &str) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Artifact de un nodo decision: recibe las step executions del elemento
/// anterior y devuelve el exit status contra el que se evalúan las
/// transiciones.
pub trait Decider: Send + Sync {
    fn decide(&self, executions: &[Arc<StepExecution>]) -> Result<String, BatchError>;
}

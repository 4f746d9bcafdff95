//! Transacciones de chunk.
//!
//! Cada intervalo de checkpoint va entre un `begin` y un `commit` (o
//! `rollback` si el intervalo falla). El motor no coordina transacciones
//! entre steps ni entre particiones.
use crate::errors::BatchError;

pub trait Transaction: Send {
    fn commit(self: Box<Self>) -> Result<(), BatchError>;
    fn rollback(self: Box<Self>) -> Result<(), BatchError>;
}

pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<Box<dyn Transaction>, BatchError>;
}

/// Sin recurso transaccional detrás: commit y rollback no hacen nada.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransactionManager;

struct NoopTransaction;

impl Transaction for NoopTransaction {
    fn commit(self: Box<Self>) -> Result<(), BatchError> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), BatchError> {
        Ok(())
    }
}

impl TransactionManager for NoopTransactionManager {
    fn begin(&self) -> Result<Box<dyn Transaction>, BatchError> {
        Ok(Box::new(NoopTransaction))
    }
}

//! Task manager sobre pools de rayon.
//!
//! - `submit`: fire-and-forget en el pool compartido (cuerpos de job y flows
//!   de un split).
//! - `submit_and_wait`: lote con concurrencia acotada en un pool propio; el
//!   hilo que llama queda bloqueado hasta que termina la última tarea y es
//!   quien invoca al listener, una vez por tarea, en orden de finalización.
//!
//! Un panic dentro de una tarea nunca escapa del worker: se captura y se
//! reporta como `BatchError::Panicked`.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use log::error;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::EngineConfig;
use crate::errors::BatchError;

/// Callbacks por tarea de un `submit_and_wait`.
pub trait TaskListener<T> {
    fn on_success(&mut self, index: usize, result: T);
    fn on_failure(&mut self, index: usize, error: BatchError);
}

pub struct TaskManager {
    pool: ThreadPool,
    thread_name_prefix: String,
}

impl TaskManager {
    pub fn new(config: &EngineConfig) -> Result<Self, BatchError> {
        let prefix = config.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new().num_threads(config.max_threads.max(1))
                                           .thread_name(move |i| format!("{prefix}-{i}"))
                                           .build()
                                           .map_err(|e| BatchError::Pool(e.to_string()))?;
        Ok(Self { pool,
                  thread_name_prefix: config.thread_name_prefix.clone() })
    }

    pub fn max_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Ejecuta `task` de forma asíncrona. El orden respecto del llamador no
    /// está definido.
    pub fn submit<F>(&self, task: F)
        where F: FnOnce() + Send + 'static
    {
        self.pool.spawn(move || {
                     if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                         error!("batch task panicked: {}", panic_message(payload.as_ref()));
                     }
                 });
    }

    /// Ejecuta `tasks` con como mucho `concurrency` en paralelo y espera a
    /// todas. El índice que recibe el listener es la posición en `tasks`.
    pub fn submit_and_wait<T, F, L>(&self, tasks: Vec<F>, concurrency: usize, listener: &mut L) -> Result<(), BatchError>
        where T: Send + 'static,
              F: FnOnce() -> Result<T, BatchError> + Send + 'static,
              L: TaskListener<T>
    {
        if tasks.is_empty() {
            return Ok(());
        }
        let total = tasks.len();
        let prefix = format!("{}-p", self.thread_name_prefix);
        let pool = ThreadPoolBuilder::new().num_threads(concurrency.clamp(1, total))
                                           .thread_name(move |i| format!("{prefix}-{i}"))
                                           .build()
                                           .map_err(|e| BatchError::Pool(e.to_string()))?;
        let (tx, rx) = mpsc::channel::<(usize, Result<T, BatchError>)>();
        for (index, task) in tasks.into_iter().enumerate() {
            let tx = tx.clone();
            pool.spawn(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(task))
                        .unwrap_or_else(|payload| Err(BatchError::Panicked(panic_message(payload.as_ref()))));
                    // el receptor sólo desaparece si el llamador ya abandonó la espera
                    let _ = tx.send((index, result));
                });
        }
        drop(tx);
        for _ in 0..total {
            match rx.recv() {
                Ok((index, Ok(value))) => listener.on_success(index, value),
                Ok((index, Err(e))) => listener.on_failure(index, e),
                Err(_) => return Err(BatchError::Pool("worker channel closed before all tasks reported".into())),
            }
        }
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

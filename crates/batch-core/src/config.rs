//! Configuración del motor.
//!
//! Se carga desde variables de entorno (el binario carga `.env` con `dotenvy`
//! antes de llegar aquí). Valores ausentes o no parseables caen a los
//! defaults de `constants`.
use std::env;

use once_cell::sync::Lazy;

use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_THREADS, DEFAULT_THREAD_PREFIX};

/// Parámetros del motor compartidos por todas las ejecuciones de un operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Número de hilos del pool compartido (job bodies y flows de un split).
    pub max_threads: usize,
    /// Prefijo de nombre de hilo; los pools de particiones añaden `-p`.
    pub thread_name_prefix: String,
    /// Buffer de escritura usado con políticas TIME/CUSTOM.
    pub default_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_threads: DEFAULT_MAX_THREADS,
               thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
               default_buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

impl EngineConfig {
    /// Lee `BATCH_MAX_THREADS`, `BATCH_THREAD_PREFIX` y
    /// `BATCH_DEFAULT_BUFFER_SIZE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_threads = env::var("BATCH_MAX_THREADS").ok()
                                                       .and_then(|v| v.parse::<usize>().ok())
                                                       .filter(|n| *n > 0)
                                                       .unwrap_or(defaults.max_threads);
        let thread_name_prefix = env::var("BATCH_THREAD_PREFIX").ok()
                                                                .filter(|v| !v.trim().is_empty())
                                                                .unwrap_or(defaults.thread_name_prefix);
        let default_buffer_size = env::var("BATCH_DEFAULT_BUFFER_SIZE").ok()
                                                                       .and_then(|v| v.parse::<usize>().ok())
                                                                       .unwrap_or(defaults.default_buffer_size);
        Self { max_threads,
               thread_name_prefix,
               default_buffer_size }
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    pub fn with_default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size;
        self
    }
}

/// Configuración global perezosa, evaluada una sola vez desde el entorno.
pub static CONFIG: Lazy<EngineConfig> = Lazy::new(EngineConfig::from_env);

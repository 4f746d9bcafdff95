//! Constantes del motor batch.
//!
//! `ENGINE_VERSION` forma parte del input del `definition_hash` de cada job:
//! un cambio de versión incompatible del motor produce hashes distintos aunque
//! la definición no cambie.

/// Versión lógica del motor.
pub const ENGINE_VERSION: &str = "B1.0";

/// Tamaño de buffer de escritura cuando la política de checkpoint no es por
/// items (TIME o CUSTOM) y el step no declara uno propio.
pub const DEFAULT_BUFFER_SIZE: usize = 10;

/// Valor centinela para límites de retry/skip sin tope.
pub const UNLIMITED: i64 = -1;

/// Tamaño por defecto del pool de workers compartido.
pub const DEFAULT_MAX_THREADS: usize = 8;

/// Prefijo por defecto para los nombres de hilo del pool.
pub const DEFAULT_THREAD_PREFIX: &str = "batch-worker";

//! Artifacts y jobs listos para usar desde el CLI y los tests end-to-end.
pub mod artifacts;
pub mod jobs;

pub use artifacts::{CollectingWriter, LoggingListener, NapBatchlet, NumberReader, RangeMapper, SquareProcessor};
pub use jobs::{fan_job, nap_job, parallel_job, sample_factory, sample_jobs, squares_job};

//! Jobs de ejemplo y la factory que resuelve sus artifacts.
use std::sync::Arc;
use std::time::Duration;

use batch_core::{
    ArtifactError, ArtifactInstance, ArtifactRequest, BatchletStep, ChunkStep, GraphBuildError, Job, JobBuilder,
    PartitionConfig, RegistryArtifactFactory, Scope,
};
use parking_lot::Mutex;
use serde_json::Value;

use super::artifacts::{CollectingWriter, LoggingListener, NapBatchlet, NumberReader, RangeMapper, SquareProcessor};

fn number<T: std::str::FromStr>(req: &ArtifactRequest<'_>, key: &str, default: T) -> Result<T, ArtifactError> {
    match req.property(key) {
        Some(raw) => raw.parse().map_err(|_| ArtifactError::Creation { reference: req.reference().to_string(),
                                                                      reason: format!("'{}' is not a valid {}", raw, key) }),
        None => Ok(default),
    }
}

/// Factory con todos los artifacts de ejemplo. Los writers escriben en `sink`.
pub fn sample_factory(sink: Arc<Mutex<Vec<Value>>>) -> RegistryArtifactFactory {
    let factory = RegistryArtifactFactory::new();
    factory.register("numberReader", |req| {
               let start = number(req, "start", 1i64)?;
               let end = number(req, "end", 100i64)?;
               Ok(ArtifactInstance::reader(NumberReader::new(start, end)))
           })
           .register("squareProcessor", |req| {
               let skip = req.property("skipMultiplesOf").and_then(|v| v.parse().ok());
               Ok(ArtifactInstance::processor(SquareProcessor { skip_multiples_of: skip }))
           })
           .register("collectingWriter", move |_| Ok(ArtifactInstance::writer(CollectingWriter::new(sink.clone()))))
           .register("napBatchlet", |req| {
               let millis = number(req, "millis", 500u64)?;
               Ok(ArtifactInstance::batchlet(NapBatchlet::new(Duration::from_millis(millis))))
           })
           .register("rangeMapper", |req| {
               Ok(ArtifactInstance::mapper(RangeMapper { start: number(req, "start", 1i64)?,
                                                         end: number(req, "end", 100i64)?,
                                                         partitions: number(req, "partitions", 4usize)?,
                                                         threads: req.property("threads").and_then(|v| v.parse().ok()) }))
           })
           .register("loggingListener", |req| {
               let name = req.step.map(|s| s.step_name().to_string()).unwrap_or_else(|| req.job.job_name().to_string());
               Ok(ArtifactInstance::listener(LoggingListener { name }))
           });
    factory
}

/// `squares`: un chunk step que eleva al cuadrado `start..=end`.
pub fn squares_job() -> Result<Job, GraphBuildError> {
    let mut b = JobBuilder::new("squares");
    b.property("start", "1").property("end", "20").listener("loggingListener");
    let step = b.chunk("square",
                       ChunkStep::new("numberReader", "collectingWriter").processor("squareProcessor")
                                                                         .commit_interval(5)
                                                                         .listener("loggingListener"));
    b.add(step)?;
    b.build()
}

/// `nap`: un batchlet que duerme `millis` (parable con stop).
pub fn nap_job() -> Result<Job, GraphBuildError> {
    let mut b = JobBuilder::new("nap");
    b.property("millis", "5000");
    let step = b.batchlet("nap", BatchletStep::new("napBatchlet"));
    b.add(step)?;
    b.build()
}

/// `fan`: el mismo chunk particionado por `rangeMapper`.
pub fn fan_job() -> Result<Job, GraphBuildError> {
    let mut b = JobBuilder::new("fan");
    b.property("start", "1").property("end", "100").property("partitions", "4");
    let step = b.chunk("square",
                       ChunkStep::new("numberReader", "collectingWriter").processor("squareProcessor")
                                                                         .commit_interval(10)
                                                                         .partitioned(PartitionConfig::mapper("rangeMapper")));
    b.add(step)?;
    b.build()
}

/// `parallel`: split con dos flows (naps cortos) y un chunk al final.
pub fn parallel_job() -> Result<Job, GraphBuildError> {
    let mut b = JobBuilder::new("parallel");
    b.property("start", "1").property("end", "10");
    let split = b.split("naps");
    let left = b.flow("left");
    let right = b.flow("right");
    let short = b.batchlet("short-nap", BatchletStep::new("napBatchlet"));
    b.node_property(short, "millis", "50")?;
    let long = b.batchlet("long-nap", BatchletStep::new("napBatchlet"));
    b.node_property(long, "millis", "150")?;
    b.attach(Scope::Node(left), short)?
     .attach(Scope::Node(right), long)?
     .attach(Scope::Node(split), left)?
     .attach(Scope::Node(split), right)?;
    let tail = b.chunk("square", ChunkStep::new("numberReader", "collectingWriter").commit_interval(5));
    b.chain(Scope::Job, &[split, tail])?;
    b.build()
}

pub fn sample_jobs() -> Result<Vec<Job>, GraphBuildError> {
    Ok(vec![squares_job()?, nap_job()?, fan_job()?, parallel_job()?])
}

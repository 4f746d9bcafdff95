#![allow(dead_code)]
//! Artifacts de prueba compartidos por los tests de integración.
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use batch_core::artifact::{
    Batchlet, ItemProcessor, ItemReader, ItemWriter, JobListener, Listener, StepListener,
};
use batch_core::{
    ArtifactInstance, BatchError, BatchStatus, EngineConfig, JobExecution, JobOperator, Properties,
    RegistryArtifactFactory,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Lee enteros `start..=end`. Si `fail_at` está fijado, ese item falla en los
/// intentos anteriores a `healthy_from`.
pub struct RangeReader {
    start: i64,
    end: i64,
    next: i64,
    fail_at: Option<i64>,
    healthy_from: u32,
    pace: Option<Duration>,
    attempts: Arc<AtomicU32>,
}

impl RangeReader {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start,
               end,
               next: start,
               fail_at: None,
               healthy_from: u32::MAX,
               pace: None,
               attempts: Arc::new(AtomicU32::new(0)) }
    }

    pub fn failing_at(mut self, item: i64, healthy_from: u32) -> Self {
        self.fail_at = Some(item);
        self.healthy_from = healthy_from;
        self
    }

    pub fn paced(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn counting_attempts(mut self, attempts: Arc<AtomicU32>) -> Self {
        self.attempts = attempts;
        self
    }
}

impl ItemReader for RangeReader {
    fn open(&mut self, checkpoint: Option<&Value>) -> Result<(), BatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.next = checkpoint.and_then(Value::as_i64).unwrap_or(self.start);
        Ok(())
    }

    fn read_item(&mut self) -> Result<Option<Value>, BatchError> {
        if let Some(pace) = self.pace {
            thread::sleep(pace);
        }
        if self.next > self.end {
            return Ok(None);
        }
        if Some(self.next) == self.fail_at && self.attempts.load(Ordering::SeqCst) < self.healthy_from {
            return Err(BatchError::item(format!("item {} unavailable", self.next)));
        }
        let item = self.next;
        self.next += 1;
        Ok(Some(json!(item)))
    }

    fn checkpoint_info(&self) -> Result<Option<Value>, BatchError> {
        Ok(Some(json!(self.next)))
    }
}

/// Escribe en una lista compartida. Su checkpoint es cuántos items escribió;
/// al reabrir descarta lo escrito después del último checkpoint.
pub struct ListWriter {
    sink: Arc<Mutex<Vec<Value>>>,
    batches: Arc<Mutex<Vec<usize>>>,
    base: Option<usize>,
}

impl ListWriter {
    pub fn new(sink: Arc<Mutex<Vec<Value>>>, batches: Arc<Mutex<Vec<usize>>>) -> Self {
        Self { sink,
               batches,
               base: None }
    }
}

impl ItemWriter for ListWriter {
    fn open(&mut self, checkpoint: Option<&Value>) -> Result<(), BatchError> {
        let mut sink = self.sink.lock();
        let base = *self.base.get_or_insert(sink.len());
        let committed = checkpoint.and_then(Value::as_u64).unwrap_or(0) as usize;
        sink.truncate(base + committed);
        Ok(())
    }

    fn write_items(&mut self, items: &[Value]) -> Result<(), BatchError> {
        self.batches.lock().push(items.len());
        self.sink.lock().extend_from_slice(items);
        Ok(())
    }

    fn checkpoint_info(&self) -> Result<Option<Value>, BatchError> {
        let written = self.sink.lock().len() - self.base.unwrap_or(0);
        Ok(Some(json!(written)))
    }
}

/// Suma items a un contador compartido; sin checkpoint propio.
pub struct CountingWriter(pub Arc<AtomicUsize>);

impl ItemWriter for CountingWriter {
    fn open(&mut self, _checkpoint: Option<&Value>) -> Result<(), BatchError> {
        Ok(())
    }

    fn write_items(&mut self, items: &[Value]) -> Result<(), BatchError> {
        self.0.fetch_add(items.len(), Ordering::SeqCst);
        Ok(())
    }
}

/// Falla con los pares y filtra los múltiplos de 5 (impares).
pub struct OddsOnly;

impl ItemProcessor for OddsOnly {
    fn process_item(&mut self, item: Value) -> Result<Option<Value>, BatchError> {
        let n = item.as_i64().unwrap_or_default();
        if n % 2 == 0 {
            return Err(BatchError::item(format!("{} is even", n)));
        }
        if n % 5 == 0 {
            return Ok(None);
        }
        Ok(Some(item))
    }
}

/// Devuelve `exit` tras dormir `sleep`.
pub struct SleepBatchlet {
    pub sleep: Duration,
    pub exit: String,
    pub finished: Option<Arc<Mutex<Vec<chrono::DateTime<chrono::Utc>>>>>,
}

impl Batchlet for SleepBatchlet {
    fn process(&self) -> Result<String, BatchError> {
        thread::sleep(self.sleep);
        if let Some(finished) = &self.finished {
            finished.lock().push(chrono::Utc::now());
        }
        Ok(self.exit.clone())
    }
}

/// Corre hasta que le llegue `stop()` (o 10 s como tope).
pub struct StoppableBatchlet {
    pub started: Arc<AtomicBool>,
    pub stopped: Arc<AtomicBool>,
}

impl Batchlet for StoppableBatchlet {
    fn process(&self) -> Result<String, BatchError> {
        self.started.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.stopped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        Ok("INTERRUPTED".into())
    }

    fn stop(&self) -> Result<(), BatchError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FailingBatchlet;

impl Batchlet for FailingBatchlet {
    fn process(&self) -> Result<String, BatchError> {
        Err(BatchError::other("boom"))
    }
}

/// Anota cada callback de job y step en un log compartido.
pub struct RecordingListener(pub Arc<Mutex<Vec<String>>>);

impl JobListener for RecordingListener {
    fn before_job(&self) -> Result<(), BatchError> {
        self.0.lock().push("before_job".into());
        Ok(())
    }

    fn after_job(&self) -> Result<(), BatchError> {
        self.0.lock().push("after_job".into());
        Ok(())
    }
}

impl StepListener for RecordingListener {
    fn before_step(&self) -> Result<(), BatchError> {
        self.0.lock().push("before_step".into());
        Ok(())
    }

    fn after_step(&self) -> Result<(), BatchError> {
        self.0.lock().push("after_step".into());
        Ok(())
    }
}

impl Listener for RecordingListener {
    fn as_job_listener(&self) -> Option<&dyn JobListener> {
        Some(self)
    }

    fn as_step_listener(&self) -> Option<&dyn StepListener> {
        Some(self)
    }
}

pub fn sink() -> Arc<Mutex<Vec<Value>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn ints(values: &[Value]) -> Vec<i64> {
    values.iter().filter_map(Value::as_i64).collect()
}

/// Registra `sleepy` (propiedad `millis`, exit `exit`) y `failing`.
pub fn register_batchlets(factory: &RegistryArtifactFactory) {
    factory.register("sleepy", |req| {
               let millis = req.property("millis").and_then(|v| v.parse().ok()).unwrap_or(1);
               let exit = req.property("exit").unwrap_or("DONE").to_string();
               Ok(ArtifactInstance::batchlet(SleepBatchlet { sleep: Duration::from_millis(millis),
                                                             exit,
                                                             finished: None }))
           })
           .register("failing", |_| Ok(ArtifactInstance::batchlet(FailingBatchlet)));
}

pub fn operator(factory: RegistryArtifactFactory) -> JobOperator {
    JobOperator::builder(Arc::new(factory)).config(EngineConfig::default().with_max_threads(4))
                                           .build()
                                           .expect("operator")
}

/// Arranca `job_name` y espera a que su ejecución termine.
pub fn run_to_end(operator: &JobOperator, job_name: &str) -> Arc<JobExecution> {
    run_with(operator, job_name, Properties::new())
}

pub fn run_with(operator: &JobOperator, job_name: &str, parameters: Properties) -> Arc<JobExecution> {
    let instance = operator.start(job_name, parameters).expect("start");
    let execution = operator.latest_execution(instance).expect("instance").expect("execution");
    let status = execution.wait_for_termination(Duration::from_secs(20));
    assert!(status.is_some(), "job '{}' did not terminate", job_name);
    execution
}

pub fn wait_until(flag: &AtomicBool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "condition never became true");
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn status_of(operator: &JobOperator, execution: &JobExecution, step: &str) -> BatchStatus {
    operator.get_step_executions(execution.execution_id())
            .expect("steps")
            .into_iter()
            .find(|s| s.step_name() == step)
            .map(|s| s.status())
            .unwrap_or_else(|| panic!("step '{}' never ran", step))
}

//! Instancias y ejecuciones.
//!
//! El repositorio crea estos objetos y los entrega como `Arc`; a partir de
//! ahí el motor los muta en sitio a través de sus setters (estado interno
//! protegido con `parking_lot::Mutex`). Nunca se borran.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use serde_json::Value;

use crate::model::{Job, NodeId, Properties};

use super::BatchStatus;

/// Una "corrida lógica" de una definición de job.
#[derive(Debug)]
pub struct JobInstance {
    instance_id: u64,
    job: Arc<Job>,
    execution_ids: Mutex<Vec<u64>>,
}

impl JobInstance {
    pub(crate) fn new(instance_id: u64, job: Arc<Job>) -> Self {
        Self { instance_id,
               job,
               execution_ids: Mutex::new(Vec::new()) }
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn job_name(&self) -> &str {
        self.job.id()
    }

    pub fn definition_hash(&self) -> &str {
        self.job.definition_hash()
    }

    pub fn execution_ids(&self) -> Vec<u64> {
        self.execution_ids.lock().clone()
    }

    pub(crate) fn add_execution(&self, execution_id: u64) {
        self.execution_ids.lock().push(execution_id);
    }
}

impl PartialEq for JobInstance {
    fn eq(&self, other: &Self) -> bool {
        self.instance_id == other.instance_id
    }
}

impl Eq for JobInstance {}

#[derive(Debug)]
struct JobExecutionState {
    status: BatchStatus,
    exit_status: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
}

/// Un intento de ejecutar una `JobInstance`.
#[derive(Debug)]
pub struct JobExecution {
    execution_id: u64,
    instance: Arc<JobInstance>,
    parameters: Properties,
    create_time: DateTime<Utc>,
    state: Mutex<JobExecutionState>,
    terminated: Condvar,
    step_execution_ids: Mutex<Vec<u64>>,
}

impl JobExecution {
    pub(crate) fn new(execution_id: u64, instance: Arc<JobInstance>, parameters: Properties) -> Self {
        let now = Utc::now();
        Self { execution_id,
               instance,
               parameters,
               create_time: now,
               state: Mutex::new(JobExecutionState { status: BatchStatus::Starting,
                                                     exit_status: None,
                                                     start_time: None,
                                                     end_time: None,
                                                     last_updated: now }),
               terminated: Condvar::new(),
               step_execution_ids: Mutex::new(Vec::new()) }
    }

    pub fn execution_id(&self) -> u64 {
        self.execution_id
    }

    pub fn instance(&self) -> &Arc<JobInstance> {
        &self.instance
    }

    pub fn job_name(&self) -> &str {
        self.instance.job_name()
    }

    /// Snapshot de los parámetros con los que se arrancó.
    pub fn parameters(&self) -> &Properties {
        &self.parameters
    }

    pub fn status(&self) -> BatchStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: BatchStatus) {
        let mut st = self.state.lock();
        st.status = status;
        st.last_updated = Utc::now();
    }

    /// Transición atómica: `f` recibe el estado actual y devuelve el nuevo,
    /// o `None` para dejarlo como está. Devuelve si hubo cambio.
    pub fn update_status(&self, f: impl FnOnce(BatchStatus) -> Option<BatchStatus>) -> bool {
        let mut st = self.state.lock();
        match f(st.status) {
            Some(next) => {
                st.status = next;
                st.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn exit_status(&self) -> Option<String> {
        self.state.lock().exit_status.clone()
    }

    pub fn set_exit_status(&self, exit_status: impl Into<String>) {
        let mut st = self.state.lock();
        st.exit_status = Some(exit_status.into());
        st.last_updated = Utc::now();
    }

    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().end_time
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.state.lock().last_updated
    }

    pub fn step_execution_ids(&self) -> Vec<u64> {
        self.step_execution_ids.lock().clone()
    }

    pub(crate) fn add_step_execution(&self, id: u64) {
        self.step_execution_ids.lock().push(id);
    }

    /// STARTING -> STARTED. Si ya se pidió stop antes de arrancar, no pisa el
    /// STOPPING.
    pub(crate) fn mark_started(&self) {
        let mut st = self.state.lock();
        let now = Utc::now();
        if st.status == BatchStatus::Starting {
            st.status = BatchStatus::Started;
        }
        st.start_time = Some(now);
        st.last_updated = now;
    }

    /// Cierra la ejecución: estado terminal, exit status por defecto (el
    /// nombre del estado) y `end_time`. Despierta a quien espere en
    /// `wait_for_termination`.
    pub(crate) fn finish(&self, status: BatchStatus) {
        let mut st = self.state.lock();
        let now = Utc::now();
        st.status = status;
        if st.exit_status.is_none() {
            st.exit_status = Some(status.to_string());
        }
        st.end_time = Some(now);
        st.last_updated = now;
        drop(st);
        self.terminated.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().end_time.is_some()
    }

    /// Bloquea hasta que la ejecución termine o venza `timeout`. Devuelve el
    /// estado final, o `None` si se agotó el tiempo.
    pub fn wait_for_termination(&self, timeout: Duration) -> Option<BatchStatus> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        while st.end_time.is_none() {
            if self.terminated.wait_until(&mut st, deadline).timed_out() {
                break;
            }
        }
        st.end_time.map(|_| st.status)
    }
}

/// Contadores de un step. Atómicos porque las particiones de un mismo step
/// los actualizan desde hilos distintos.
#[derive(Debug, Default)]
pub struct StepMetrics {
    read_count: AtomicU64,
    write_count: AtomicU64,
    commit_count: AtomicU64,
    rollback_count: AtomicU64,
    process_skip_count: AtomicU64,
    filter_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub read_count: u64,
    pub write_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub process_skip_count: u64,
    pub filter_count: u64,
}

impl StepMetrics {
    pub(crate) fn add_read(&self, n: u64) {
        self.read_count.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_write(&self, n: u64) {
        self.write_count.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_commit(&self) {
        self.commit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_rollback(&self) {
        self.rollback_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_process_skip(&self) {
        self.process_skip_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_filter(&self) {
        self.filter_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot { read_count: self.read_count.load(Ordering::Relaxed),
                          write_count: self.write_count.load(Ordering::Relaxed),
                          commit_count: self.commit_count.load(Ordering::Relaxed),
                          rollback_count: self.rollback_count.load(Ordering::Relaxed),
                          process_skip_count: self.process_skip_count.load(Ordering::Relaxed),
                          filter_count: self.filter_count.load(Ordering::Relaxed) }
    }
}

#[derive(Debug)]
struct StepExecutionState {
    status: BatchStatus,
    exit_status: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    reader_checkpoint: Option<Value>,
    writer_checkpoint: Option<Value>,
    persistent_user_data: Option<Value>,
}

/// Ejecución de un step dentro de una `JobExecution`.
#[derive(Debug)]
pub struct StepExecution {
    id: u64,
    job_execution_id: u64,
    step_name: String,
    node: NodeId,
    state: Mutex<StepExecutionState>,
    metrics: StepMetrics,
}

impl StepExecution {
    pub(crate) fn new(id: u64, job_execution_id: u64, step_name: String, node: NodeId) -> Self {
        Self { id,
               job_execution_id,
               step_name,
               node,
               state: Mutex::new(StepExecutionState { status: BatchStatus::Starting,
                                                      exit_status: None,
                                                      start_time: None,
                                                      end_time: None,
                                                      reader_checkpoint: None,
                                                      writer_checkpoint: None,
                                                      persistent_user_data: None }),
               metrics: StepMetrics::default() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn job_execution_id(&self) -> u64 {
        self.job_execution_id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Nodo del grafo que originó esta ejecución.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn status(&self) -> BatchStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: BatchStatus) {
        self.state.lock().status = status;
    }

    pub fn update_status(&self, f: impl FnOnce(BatchStatus) -> Option<BatchStatus>) -> bool {
        let mut st = self.state.lock();
        match f(st.status) {
            Some(next) => {
                st.status = next;
                true
            }
            None => false,
        }
    }

    pub fn exit_status(&self) -> Option<String> {
        self.state.lock().exit_status.clone()
    }

    pub fn set_exit_status(&self, exit_status: impl Into<String>) {
        self.state.lock().exit_status = Some(exit_status.into());
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().end_time
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn counters(&self) -> &StepMetrics {
        &self.metrics
    }

    /// Último checkpoint confirmado de reader y writer.
    pub fn checkpoints(&self) -> (Option<Value>, Option<Value>) {
        let st = self.state.lock();
        (st.reader_checkpoint.clone(), st.writer_checkpoint.clone())
    }

    pub(crate) fn set_checkpoints(&self, reader: Option<Value>, writer: Option<Value>) {
        let mut st = self.state.lock();
        st.reader_checkpoint = reader;
        st.writer_checkpoint = writer;
    }

    pub fn persistent_user_data(&self) -> Option<Value> {
        self.state.lock().persistent_user_data.clone()
    }

    pub fn set_persistent_user_data(&self, data: Value) {
        self.state.lock().persistent_user_data = Some(data);
    }

    pub(crate) fn mark_started(&self) {
        let mut st = self.state.lock();
        if st.status == BatchStatus::Starting {
            st.status = BatchStatus::Started;
        }
        st.start_time = Some(Utc::now());
    }

    /// Estado terminal + exit status por defecto + `end_time`.
    pub(crate) fn finish(&self, status: BatchStatus) {
        let mut st = self.state.lock();
        st.status = status;
        if st.exit_status.is_none() {
            st.exit_status = Some(status.to_string());
        }
        st.end_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobBuilder;

    fn execution() -> JobExecution {
        let job = Arc::new(JobBuilder::new("job").build().unwrap());
        let instance = Arc::new(JobInstance::new(1, job));
        JobExecution::new(1, instance, Properties::new())
    }

    #[test]
    fn finish_defaults_exit_status_to_status_name() {
        let exec = execution();
        assert_eq!(exec.status(), BatchStatus::Starting);
        exec.mark_started();
        exec.finish(BatchStatus::Completed);
        assert_eq!(exec.exit_status().as_deref(), Some("COMPLETED"));

        let exec = execution();
        exec.set_exit_status("CUSTOM");
        exec.finish(BatchStatus::Failed);
        assert_eq!(exec.exit_status().as_deref(), Some("CUSTOM"));
    }

    #[test]
    fn mark_started_keeps_a_pending_stop() {
        let exec = execution();
        exec.set_status(BatchStatus::Stopping);
        exec.mark_started();
        assert_eq!(exec.status(), BatchStatus::Stopping);
        assert!(exec.start_time().is_some());
    }

    #[test]
    fn wait_for_termination_times_out_then_sees_finish() {
        let exec = Arc::new(execution());
        assert_eq!(exec.wait_for_termination(Duration::from_millis(10)), None);

        let other = exec.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            other.finish(BatchStatus::Stopped);
        });
        assert_eq!(exec.wait_for_termination(Duration::from_secs(5)), Some(BatchStatus::Stopped));
        handle.join().unwrap();
    }

    #[test]
    fn update_status_is_conditional() {
        let exec = execution();
        assert!(!exec.update_status(|s| (s == BatchStatus::Started).then_some(BatchStatus::Stopping)));
        exec.mark_started();
        assert!(exec.update_status(|s| (s == BatchStatus::Started).then_some(BatchStatus::Stopping)));
        assert_eq!(exec.status(), BatchStatus::Stopping);
    }

    #[test]
    fn step_metrics_accumulate() {
        let step = StepExecution::new(1, 1, "s".into(), NodeId(0));
        step.counters().add_read(3);
        step.counters().add_write(2);
        step.counters().add_commit();
        let m = step.metrics();
        assert_eq!((m.read_count, m.write_count, m.commit_count), (3, 2, 1));
    }
}

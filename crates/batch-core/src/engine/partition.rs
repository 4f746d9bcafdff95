//! Steps particionados: fan-out con concurrencia acotada y fan-in bloqueante.
//!
//! El hilo del step resuelve el plan, lanza una tarea por partición con
//! `submit_and_wait` y queda bloqueado hasta que terminan todas. Cada
//! partición corre con contextos propios (job desacoplado + step de
//! partición) y su propio `ArtifactContainer`. El analyzer se alimenta desde
//! el hilo del step a medida que las particiones terminan. Un fallo no
//! cancela a las hermanas.
use std::sync::Arc;

use log::{error, info, warn};
use serde_json::Value;

use crate::artifact::{
    ArtifactContainer, PartitionStatus, SharedAnalyzer, SharedCollector, SharedListener, SharedMapper, SharedReducer,
};
use crate::context::{JobContext, StepContext};
use crate::errors::BatchError;
use crate::event::BatchEventKind;
use crate::model::{ArtifactRef, Job, Node, NodeId, NodeKind, PartitionConfig, PartitionPlan, PartitionSource, Properties};
use crate::repo::{BatchStatus, StepExecution};
use crate::task::TaskListener;

use super::{batchlet, chunk, Engine, JobRun};

/// Lo que una partición terminada devuelve al hilo del step.
#[derive(Debug)]
pub(crate) struct PartitionResult {
    status: BatchStatus,
    exit_status: String,
    collected: Option<Value>,
}

pub(crate) fn run_partitioned(run: &Arc<JobRun>,
                              job_ctx: &JobContext,
                              step_ctx: &StepContext,
                              node: &Node,
                              config: &PartitionConfig,
                              container: &mut ArtifactContainer)
                              -> Result<BatchStatus, BatchError> {
    let reducer: Option<SharedReducer> = config.reducer
                                               .as_ref()
                                               .map(|r| container.create(r, job_ctx, Some(step_ctx)))
                                               .transpose()?;
    if let Some(r) = &reducer {
        r.begin_partitioned_step()?;
    }

    let outcome = fan_out(run, job_ctx, step_ctx, node, config, container).and_then(|status| {
                                                                               match &reducer {
                                                                                   Some(r) => r.before_partitioned_step_completion().map(|_| status),
                                                                                   None => Ok(status),
                                                                               }
                                                                           });

    if let Some(r) = &reducer {
        match &outcome {
            Ok(_) => r.after_partitioned_step_completion(PartitionStatus::Commit)?,
            Err(_) => {
                if let Err(e) = r.rollback_partitioned_step() {
                    warn!("step '{}': reducer rollback failed: {}", node.id(), e);
                }
                if let Err(e) = r.after_partitioned_step_completion(PartitionStatus::Rollback) {
                    warn!("step '{}': reducer after-completion failed: {}", node.id(), e);
                }
            }
        }
    }
    outcome
}

fn resolve_plan(config: &PartitionConfig,
                job_ctx: &JobContext,
                step_ctx: &StepContext,
                node: &Node,
                container: &mut ArtifactContainer)
                -> Result<PartitionPlan, BatchError> {
    let plan = match &config.source {
        PartitionSource::Plan(plan) => plan.clone(),
        PartitionSource::Mapper(mapper) => {
            let mapper: SharedMapper = container.create(mapper, job_ctx, Some(step_ctx))?;
            mapper.map_partitions()?
        }
    };
    plan.validate(node.id()).map_err(|e| BatchError::other(e.to_string()))?;
    Ok(plan)
}

fn fan_out(run: &Arc<JobRun>,
           job_ctx: &JobContext,
           step_ctx: &StepContext,
           node: &Node,
           config: &PartitionConfig,
           container: &mut ArtifactContainer)
           -> Result<BatchStatus, BatchError> {
    let plan = resolve_plan(config, job_ctx, step_ctx, node, container)?;
    let analyzer: Option<SharedAnalyzer> = config.analyzer
                                                 .as_ref()
                                                 .map(|a| container.create(a, job_ctx, Some(step_ctx)))
                                                 .transpose()?;
    let threads = plan.effective_threads();
    info!("step '{}': {} partitions on {} threads", node.id(), plan.partitions, threads);

    let tasks: Vec<_> = (0..plan.partitions).map(|index| {
                                                let mut properties = node.properties().clone();
                                                if let Some(overrides) = plan.properties_for(index) {
                                                    properties.extend(overrides.clone());
                                                }
                                                let task = PartitionTask { engine: run.engine.clone(),
                                                                           job: run.job.clone(),
                                                                           node: node.index(),
                                                                           index,
                                                                           properties,
                                                                           job_ctx: job_ctx.detached(),
                                                                           step_execution: step_ctx.execution().clone(),
                                                                           collector: config.collector.clone() };
                                                move || task.run()
                                            })
                                            .collect();

    let mut fan_in = FanIn { engine: &run.engine,
                             step: node.id(),
                             execution_id: job_ctx.execution_id(),
                             analyzer,
                             stopped: false,
                             failure: None,
                             analyzer_error: None,
                             last_exit_status: None };
    run.engine.tasks.submit_and_wait(tasks, threads, &mut fan_in)?;

    if step_ctx.exit_status().is_none() {
        if let Some(exit) = &fan_in.last_exit_status {
            step_ctx.set_exit_status(exit.clone());
        }
    }
    if let Some((index, reason)) = fan_in.failure {
        return Err(BatchError::Partition { index, reason });
    }
    if let Some(e) = fan_in.analyzer_error {
        return Err(e);
    }
    Ok(if fan_in.stopped { BatchStatus::Stopped } else { BatchStatus::Completed })
}

struct PartitionTask {
    engine: Arc<Engine>,
    job: Arc<Job>,
    node: NodeId,
    index: usize,
    properties: Properties,
    job_ctx: JobContext,
    step_execution: Arc<StepExecution>,
    collector: Option<ArtifactRef>,
}

impl PartitionTask {
    fn run(self) -> Result<PartitionResult, BatchError> {
        let node = self.job.node(self.node);
        let step_ctx = StepContext::for_partition(self.node,
                                                  self.properties.clone(),
                                                  self.step_execution.clone(),
                                                  self.job_ctx.execution().clone(),
                                                  self.index);
        let mut container = ArtifactContainer::new(self.engine.factory.clone());
        let result = self.body(node, &step_ctx, &mut container);
        if let Err(e) = container.release() {
            warn!("step '{}' partition {}: releasing artifacts failed: {}", node.id(), self.index, e);
        }
        if let Err(e) = &result {
            error!("step '{}' partition {} failed: {}", node.id(), self.index, e);
            step_ctx.record_error(e.to_string());
        }
        result
    }

    fn body(&self,
            node: &Node,
            step_ctx: &StepContext,
            container: &mut ArtifactContainer)
            -> Result<PartitionResult, BatchError> {
        // los listeners de chunk se instancian por partición
        for listener in node.listeners() {
            container.create::<SharedListener>(listener, &self.job_ctx, Some(step_ctx))?;
        }
        let status = match node.kind() {
            NodeKind::Batchlet(step) => batchlet::run_batchlet(&self.engine, step, &self.job_ctx, step_ctx, container)?,
            NodeKind::Chunk(step) => chunk::run_chunk(&self.engine, step, &self.job_ctx, step_ctx, container)?,
            other => return Err(BatchError::other(format!("cannot partition a {}", other.label()))),
        };
        let collected = match &self.collector {
            Some(reference) => {
                let collector: SharedCollector = container.create(reference, &self.job_ctx, Some(step_ctx))?;
                collector.collect_partition_data()?
            }
            None => None,
        };
        Ok(PartitionResult { status,
                             exit_status: step_ctx.exit_status().unwrap_or_else(|| status.to_string()),
                             collected })
    }
}

/// Recibe los resultados en el hilo del step, en orden de finalización.
struct FanIn<'a> {
    engine: &'a Engine,
    step: &'a str,
    execution_id: u64,
    analyzer: Option<SharedAnalyzer>,
    stopped: bool,
    failure: Option<(usize, String)>,
    analyzer_error: Option<BatchError>,
    last_exit_status: Option<String>,
}

impl FanIn<'_> {
    fn analyze(&mut self, status: BatchStatus, exit_status: &str, collected: Option<&Value>) {
        let Some(analyzer) = &self.analyzer else {
            return;
        };
        let analyzed = match collected {
            Some(data) => analyzer.analyze_collector_data(data),
            None => Ok(()),
        }.and_then(|_| analyzer.analyze_status(status, exit_status));
        if let Err(e) = analyzed {
            warn!("step '{}': partition analyzer failed: {}", self.step, e);
            self.analyzer_error.get_or_insert(e);
        }
    }

    fn finished(&mut self, index: usize, status: BatchStatus, exit_status: String) {
        self.engine.emit(self.execution_id,
                         BatchEventKind::PartitionFinished { step: self.step.to_string(),
                                                             index,
                                                             status,
                                                             exit_status: exit_status.clone() });
        self.last_exit_status = Some(exit_status);
    }
}

impl TaskListener<PartitionResult> for FanIn<'_> {
    fn on_success(&mut self, index: usize, result: PartitionResult) {
        self.analyze(result.status, &result.exit_status, result.collected.as_ref());
        match result.status {
            BatchStatus::Stopped | BatchStatus::Stopping => self.stopped = true,
            BatchStatus::Failed => {
                self.failure.get_or_insert((index, result.exit_status.clone()));
            }
            _ => {}
        }
        self.finished(index, result.status, result.exit_status);
    }

    fn on_failure(&mut self, index: usize, error: BatchError) {
        let failed = BatchStatus::Failed.to_string();
        self.analyze(BatchStatus::Failed, &failed, None);
        self.failure.get_or_insert((index, error.to_string()));
        self.finished(index, BatchStatus::Failed, failed);
    }
}

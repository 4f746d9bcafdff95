//! Recorrido del grafo: un caso por tipo de nodo.
use std::sync::Arc;

use log::{debug, error, info};

use crate::context::JobContext;
use crate::model::{Job, Node, NodeKind, Scope};
use crate::repo::StepExecution;

use super::{decision, step, JobRun};

/// Resultado de visitar un nodo.
pub(crate) enum Transit {
    /// Seguir por `next`; lleva las step executions que produjo el nodo
    /// (las que verá una decisión posterior).
    Continue(Vec<Arc<StepExecution>>),
    /// Saltar al hermano con este id (transición `next` de una decisión).
    Jump(String),
    /// Cortar la cadena: fallo, stop o fin decidido.
    Halt,
}

pub(crate) struct Walker {
    run: Arc<JobRun>,
    context: JobContext,
}

impl Walker {
    pub(crate) fn new(run: Arc<JobRun>, context: JobContext) -> Self {
        Self { run, context }
    }

    /// Recorre la cadena de `scope` desde su primer nodo encadenable.
    pub(crate) fn walk(&self, scope: Scope) -> Transit {
        let job = self.run.job.clone();
        match job.first_chainable(scope) {
            Some(first) => self.walk_from(&job, first),
            None => Transit::Continue(Vec::new()),
        }
    }

    fn walk_from(&self, job: &Job, first: &Node) -> Transit {
        let mut current = Some(first);
        let mut previous: Vec<Arc<StepExecution>> = Vec::new();
        while let Some(node) = current {
            if self.run.stop_requested() {
                info!("job '{}' execution {}: stop requested, not entering '{}'",
                      job.id(),
                      self.run.execution.execution_id(),
                      node.id());
                self.run.mark_stopped();
                return Transit::Halt;
            }
            match self.visit(job, node, &previous) {
                Transit::Halt => return Transit::Halt,
                Transit::Continue(executions) => {
                    previous = executions;
                    current = job.resolve_next(node);
                }
                Transit::Jump(to) => {
                    current = node.container().and_then(|scope| job.find(scope, &to));
                    if current.is_none() {
                        error!("job '{}': decision '{}' routes to unknown element '{}'", job.id(), node.id(), to);
                        self.run.mark_failed();
                        return Transit::Halt;
                    }
                }
            }
        }
        Transit::Continue(previous)
    }

    pub(crate) fn visit(&self, job: &Job, node: &Node, previous: &[Arc<StepExecution>]) -> Transit {
        match node.kind() {
            NodeKind::Flow(_) => {
                debug!("entering flow '{}'", node.id());
                self.walk(Scope::Node(node.index()))
            }
            NodeKind::Split(children) => {
                debug!("split '{}': launching {} flows", node.id(), children.len());
                for flow in children.ids() {
                    self.run.spawn_branch(self.context.fresh(), flow);
                }
                Transit::Continue(Vec::new())
            }
            NodeKind::Decision(d) => decision::evaluate(&self.run, &self.context, node, d, previous),
            NodeKind::Batchlet(_) | NodeKind::Chunk(_) => step::run_step(&self.run, &self.context, job, node),
        }
    }
}

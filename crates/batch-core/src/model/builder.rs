//! Builder del grafo de job.
//!
//! Los nodos se crean sueltos (cada método devuelve su `NodeId`) y luego se
//! cuelgan de un contenedor con `attach`/`add`/`chain`. Las comprobaciones de
//! pertenencia (ids duplicados entre hermanos, nodo ya adjunto, ciclos de
//! contención, split sólo con flows) se hacen al adjuntar; el resto
//! (huérfanos, `next` sin resolver, parámetros de chunk, splits con menos de
//! 2 flows) en `build()`.
//!
//! ```ignore
//! let mut b = JobBuilder::new("payroll");
//! let load = b.chunk("load", ChunkStep::new("csvReader", "dbWriter").commit_interval(50));
//! let report = b.batchlet("report", BatchletStep::new("reportBatchlet"));
//! b.chain(Scope::Job, &[load, report])?;
//! let job = b.build()?;
//! ```
use std::collections::HashMap;

use serde_json::json;

use crate::constants::ENGINE_VERSION;
use crate::errors::GraphBuildError;
use crate::hashing::hash_value;

use super::step::require_ref;
use super::{
    ArtifactRef, BatchletStep, ChunkStep, Container, Decision, Job, Node, NodeId, NodeKind, Properties, Scope,
    Transition,
};

#[derive(Debug, Clone)]
pub struct JobBuilder {
    id: String,
    properties: Properties,
    listeners: Vec<ArtifactRef>,
    root: Container,
    nodes: Vec<Node>,
}

impl JobBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(),
               properties: Properties::new(),
               listeners: Vec::new(),
               root: Container::default(),
               nodes: Vec::new() }
    }

    pub fn property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Listener a nivel de job (`before_job`/`after_job`).
    pub fn listener(&mut self, listener: impl Into<ArtifactRef>) -> &mut Self {
        self.listeners.push(listener.into());
        self
    }

    fn push(&mut self, id: impl Into<String>, kind: NodeKind) -> NodeId {
        let index = NodeId(self.nodes.len());
        self.nodes.push(Node::new(index, id.into(), kind));
        index
    }

    pub fn batchlet(&mut self, id: impl Into<String>, step: BatchletStep) -> NodeId {
        self.push(id, NodeKind::Batchlet(step))
    }

    pub fn chunk(&mut self, id: impl Into<String>, step: ChunkStep) -> NodeId {
        self.push(id, NodeKind::Chunk(step))
    }

    pub fn flow(&mut self, id: impl Into<String>) -> NodeId {
        self.push(id, NodeKind::Flow(Container::default()))
    }

    pub fn split(&mut self, id: impl Into<String>) -> NodeId {
        self.push(id, NodeKind::Split(Container::default()))
    }

    pub fn decision(&mut self, id: impl Into<String>, decision: Decision) -> NodeId {
        self.push(id, NodeKind::Decision(decision))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut Node, GraphBuildError> {
        self.nodes.get_mut(node.0).ok_or(GraphBuildError::UnknownNode(node.0))
    }

    /// Fija el hermano que se ejecuta tras `node`.
    pub fn next(&mut self, node: NodeId, to: impl Into<String>) -> Result<&mut Self, GraphBuildError> {
        self.node_mut(node)?.next = Some(to.into());
        Ok(self)
    }

    pub fn node_property(&mut self,
                         node: NodeId,
                         key: impl Into<String>,
                         value: impl Into<String>)
                         -> Result<&mut Self, GraphBuildError> {
        self.node_mut(node)?.properties.insert(key.into(), value.into());
        Ok(self)
    }

    fn scope_name(&self, scope: Scope) -> String {
        match scope {
            Scope::Job => self.id.clone(),
            Scope::Node(n) => self.nodes.get(n.0).map(|n| n.id.clone()).unwrap_or_default(),
        }
    }

    /// Cuelga `child` de `parent`.
    pub fn attach(&mut self, parent: Scope, child: NodeId) -> Result<&mut Self, GraphBuildError> {
        let child_node = self.nodes.get(child.0).ok_or(GraphBuildError::UnknownNode(child.0))?;
        if child_node.container.is_some() {
            return Err(GraphBuildError::AlreadyAttached(child_node.id.clone()));
        }
        let child_id = child_node.id.clone();
        let child_is_flow = matches!(child_node.kind, NodeKind::Flow(_));

        if let Scope::Node(p) = parent {
            let parent_node = self.nodes.get(p.0).ok_or(GraphBuildError::UnknownNode(p.0))?;
            if parent_node.children().is_none() {
                return Err(GraphBuildError::NotAContainer(parent_node.id.clone()));
            }
            if matches!(parent_node.kind, NodeKind::Split(_)) && !child_is_flow {
                return Err(GraphBuildError::SplitChildNotFlow { split: parent_node.id.clone(),
                                                                child: child_id });
            }
            // subir por los contenedores del padre: el hijo no puede ser ancestro
            let mut cursor = Some(Scope::Node(p));
            while let Some(Scope::Node(n)) = cursor {
                if n == child {
                    return Err(GraphBuildError::Cycle(child_id));
                }
                cursor = self.nodes[n.0].container;
            }
        }

        let duplicate = match parent {
            Scope::Job => self.root.contains(&child_id),
            Scope::Node(p) => self.nodes[p.0].children().is_some_and(|c| c.contains(&child_id)),
        };
        if duplicate {
            return Err(GraphBuildError::DuplicateId { id: child_id,
                                                      container: self.scope_name(parent) });
        }

        match parent {
            Scope::Job => self.root.insert(child_id, child),
            Scope::Node(p) => {
                if let Some(c) = self.nodes[p.0].children_mut() {
                    c.insert(child_id, child);
                }
            }
        }
        self.nodes[child.0].container = Some(parent);
        Ok(self)
    }

    /// Atajo para adjuntar a la raíz del job.
    pub fn add(&mut self, child: NodeId) -> Result<&mut Self, GraphBuildError> {
        self.attach(Scope::Job, child)
    }

    /// Adjunta `nodes` a `scope` y los encadena con `next` en ese orden. El
    /// `next` del último no se toca.
    pub fn chain(&mut self, scope: Scope, nodes: &[NodeId]) -> Result<&mut Self, GraphBuildError> {
        for n in nodes {
            self.attach(scope, *n)?;
        }
        for pair in nodes.windows(2) {
            let to = self.nodes[pair[1].0].id.clone();
            self.next(pair[0], to)?;
        }
        Ok(self)
    }

    /// Valida el grafo completo y calcula su `definition_hash`.
    pub fn build(self) -> Result<Job, GraphBuildError> {
        if let Some(orphan) = self.nodes.iter().find(|n| n.container.is_none()) {
            return Err(GraphBuildError::Orphan(orphan.id.clone()));
        }
        for l in &self.listeners {
            require_ref(&self.id, "listener", l)?;
        }
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Split(c) if c.len() < 2 => {
                    return Err(GraphBuildError::SplitTooSmall { id: node.id.clone(),
                                                                found: c.len() });
                }
                NodeKind::Batchlet(step) => step.validate(&node.id)?,
                NodeKind::Chunk(step) => step.validate(&node.id)?,
                NodeKind::Decision(d) => require_ref(&node.id, "decider", &d.decider)?,
                _ => {}
            }
            for to in successors(node) {
                let resolved = node.container.is_some_and(|scope| match scope {
                                                 Scope::Job => self.root.contains(to),
                                                 Scope::Node(p) => {
                                                     self.nodes[p.0].children().is_some_and(|c| c.contains(to))
                                                 }
                                             });
                if !resolved {
                    return Err(GraphBuildError::UnresolvedNext { from: node.id.clone(),
                                                                 to: to.to_string() });
                }
            }
        }
        self.check_transition_cycles()?;

        let mut job = Job { id: self.id,
                            properties: self.properties,
                            listeners: self.listeners,
                            root: self.root,
                            nodes: self.nodes,
                            definition_hash: String::new() };
        let definition =
            serde_json::to_value(&job).map_err(|e| GraphBuildError::Serialization(e.to_string()))?;
        job.definition_hash = hash_value(&json!({
                                             "engine_version": ENGINE_VERSION,
                                             "definition": definition,
                                         }));
        Ok(job)
    }

    /// Las transiciones entre hermanos (`next` y `Next` de decisiones) no
    /// pueden formar ciclos: el walker los recorrería para siempre.
    fn check_transition_cycles(&self) -> Result<(), GraphBuildError> {
        let mut containers: Vec<&Container> = vec![&self.root];
        containers.extend(self.nodes.iter().filter_map(Node::children));
        for container in containers {
            let ids: Vec<NodeId> = container.ids().collect();
            let mut state: HashMap<NodeId, bool> = HashMap::new(); // false = en curso, true = cerrado
            for start in &ids {
                self.visit_transitions(container, *start, &mut state)?;
            }
        }
        Ok(())
    }

    fn visit_transitions(&self,
                         container: &Container,
                         node: NodeId,
                         state: &mut HashMap<NodeId, bool>)
                         -> Result<(), GraphBuildError> {
        match state.get(&node) {
            Some(true) => return Ok(()),
            Some(false) => return Err(GraphBuildError::Cycle(self.nodes[node.0].id.clone())),
            None => {}
        }
        state.insert(node, false);
        for to in successors(&self.nodes[node.0]) {
            if let Some(next) = container.get(to) {
                self.visit_transitions(container, next, state)?;
            }
        }
        state.insert(node, true);
        Ok(())
    }
}

/// Ids de hermanos alcanzables directamente desde `node`.
fn successors(node: &Node) -> Vec<&str> {
    let mut out: Vec<&str> = node.next.as_deref().into_iter().collect();
    if let NodeKind::Decision(d) = &node.kind {
        out.extend(d.transitions.iter().filter_map(|t| match t {
                                            Transition::Next { to, .. } => Some(to.as_str()),
                                            _ => None,
                                        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PartitionConfig, PartitionPlan};

    fn batchlet(b: &mut JobBuilder, id: &str) -> NodeId {
        b.batchlet(id, BatchletStep::new("noop"))
    }

    #[test]
    fn duplicate_sibling_ids_fail() {
        let mut b = JobBuilder::new("job");
        let s1 = batchlet(&mut b, "s1");
        let dup = batchlet(&mut b, "s1");
        b.add(s1).unwrap();
        let err = b.add(dup).unwrap_err();
        assert_eq!(err,
                   GraphBuildError::DuplicateId { id: "s1".into(),
                                                  container: "job".into() });
    }

    #[test]
    fn same_id_in_different_containers_is_fine() {
        let mut b = JobBuilder::new("job");
        let flow = b.flow("f1");
        let outer = batchlet(&mut b, "s1");
        let inner = batchlet(&mut b, "s1");
        b.attach(Scope::Node(flow), inner).unwrap();
        b.chain(Scope::Job, &[outer, flow]).unwrap();
        assert!(b.build().is_ok());
    }

    #[test]
    fn node_cannot_be_attached_twice() {
        let mut b = JobBuilder::new("job");
        let flow = b.flow("f1");
        let s1 = batchlet(&mut b, "s1");
        b.add(s1).unwrap();
        let err = b.attach(Scope::Node(flow), s1).unwrap_err();
        assert_eq!(err, GraphBuildError::AlreadyAttached("s1".into()));
    }

    #[test]
    fn flow_cannot_contain_its_ancestor() {
        let mut b = JobBuilder::new("job");
        let outer = b.flow("outer");
        let inner = b.flow("inner");
        b.attach(Scope::Node(outer), inner).unwrap();
        let err = b.attach(Scope::Node(inner), outer).unwrap_err();
        assert_eq!(err, GraphBuildError::Cycle("outer".into()));
    }

    #[test]
    fn steps_are_not_containers() {
        let mut b = JobBuilder::new("job");
        let s1 = batchlet(&mut b, "s1");
        let s2 = batchlet(&mut b, "s2");
        assert_eq!(b.attach(Scope::Node(s1), s2).unwrap_err(), GraphBuildError::NotAContainer("s1".into()));
    }

    #[test]
    fn split_needs_two_flows() {
        let mut b = JobBuilder::new("job");
        let split = b.split("sp");
        let f1 = b.flow("f1");
        let s = batchlet(&mut b, "s");
        b.attach(Scope::Node(f1), s).unwrap();
        b.attach(Scope::Node(split), f1).unwrap();
        b.add(split).unwrap();
        assert_eq!(b.build().unwrap_err(),
                   GraphBuildError::SplitTooSmall { id: "sp".into(),
                                                    found: 1 });
    }

    #[test]
    fn split_rejects_non_flow_children() {
        let mut b = JobBuilder::new("job");
        let split = b.split("sp");
        let s = batchlet(&mut b, "s");
        assert!(matches!(b.attach(Scope::Node(split), s), Err(GraphBuildError::SplitChildNotFlow { .. })));
    }

    #[test]
    fn orphans_and_unresolved_next_fail_build() {
        let mut b = JobBuilder::new("job");
        let s1 = batchlet(&mut b, "s1");
        let _orphan = batchlet(&mut b, "lost");
        b.add(s1).unwrap();
        assert_eq!(b.clone().build().unwrap_err(), GraphBuildError::Orphan("lost".into()));

        let mut b = JobBuilder::new("job");
        let s1 = batchlet(&mut b, "s1");
        b.add(s1).unwrap().next(s1, "missing").unwrap();
        assert!(matches!(b.build(), Err(GraphBuildError::UnresolvedNext { .. })));
    }

    #[test]
    fn next_cycles_are_rejected() {
        let mut b = JobBuilder::new("job");
        let s1 = batchlet(&mut b, "s1");
        let s2 = batchlet(&mut b, "s2");
        b.chain(Scope::Job, &[s1, s2]).unwrap().next(s2, "s1").unwrap();
        assert!(matches!(b.build(), Err(GraphBuildError::Cycle(_))));
    }

    #[test]
    fn first_chainable_skips_decisions() {
        let mut b = JobBuilder::new("job");
        let d = b.decision("d", Decision::new("decider").transition(Transition::end("*")));
        let s1 = batchlet(&mut b, "s1");
        b.add(d).unwrap().add(s1).unwrap();
        let job = b.build().unwrap();
        assert_eq!(job.first_chainable(Scope::Job).map(|n| n.id()), Some("s1"));

        let empty = JobBuilder::new("empty").build().unwrap();
        assert!(empty.first_chainable(Scope::Job).is_none());
    }

    #[test]
    fn chain_wires_next_and_resolves() {
        let mut b = JobBuilder::new("job");
        let s1 = batchlet(&mut b, "s1");
        let s2 = batchlet(&mut b, "s2");
        b.chain(Scope::Job, &[s1, s2]).unwrap();
        let job = b.build().unwrap();
        let first = job.first_chainable(Scope::Job).unwrap();
        assert_eq!(job.resolve_next(first).map(|n| n.id()), Some("s2"));
        assert!(job.resolve_next(job.node(s2)).is_none());
    }

    #[test]
    fn invalid_chunk_parameters_surface_at_build() {
        let mut b = JobBuilder::new("job");
        let s = b.chunk("c", ChunkStep::new("r", "w").commit_interval(0));
        b.add(s).unwrap();
        assert!(matches!(b.build(), Err(GraphBuildError::InvalidParameter { .. })));

        let mut b = JobBuilder::new("job");
        let plan = PartitionConfig::plan(PartitionPlan::new(0));
        let s = b.batchlet("p", BatchletStep::new("noop").partitioned(plan));
        b.add(s).unwrap();
        assert!(matches!(b.build(), Err(GraphBuildError::InvalidParameter { .. })));
    }

    #[test]
    fn definition_hash_is_stable_and_sensitive() {
        let make = |interval: u32| {
            let mut b = JobBuilder::new("job");
            let s = b.chunk("c", ChunkStep::new("r", "w").commit_interval(interval));
            b.add(s).unwrap();
            b.build().unwrap()
        };
        assert_eq!(make(3).definition_hash(), make(3).definition_hash());
        assert_ne!(make(3).definition_hash(), make(4).definition_hash());
    }

    #[test]
    fn get_artifact_searches_step_artifacts() {
        let mut b = JobBuilder::new("job");
        let step = ChunkStep::new("reader", "writer").processor("proc")
                                                     .listener("stepListener")
                                                     .partitioned(PartitionConfig::plan(PartitionPlan::new(2)).collector("coll"));
        let s = b.chunk("c", step);
        b.add(s).unwrap();
        let job = b.build().unwrap();
        let node = job.node(s);
        assert_eq!(node.artifact("proc").map(|a| a.reference.as_str()), Ok("proc"));
        assert_eq!(node.artifact("coll").map(|a| a.reference.as_str()), Ok("coll"));
        assert!(node.artifact("nope").is_err());
    }
}

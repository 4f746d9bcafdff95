//! Nodos del grafo y contenedores.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::ArtifactError;

use super::{ArtifactRef, BatchletStep, ChunkStep, Decision, Properties};

/// Índice de un nodo dentro del arena del `Job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Contenedor de un nodo: la raíz del job o un flow/split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Job,
    Node(NodeId),
}

/// Hijos de un contenedor, en orden de declaración e indexados por id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    children: IndexMap<String, NodeId>,
}

impl Container {
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.children.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.children.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    pub(crate) fn insert(&mut self, id: String, node: NodeId) {
        self.children.insert(id, node);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Flow(Container),
    Split(Container),
    Decision(Decision),
    Batchlet(BatchletStep),
    Chunk(ChunkStep),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Flow(_) => "flow",
            Self::Split(_) => "split",
            Self::Decision(_) => "decision",
            Self::Batchlet(_) => "batchlet-step",
            Self::Chunk(_) => "chunk-step",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) index: NodeId,
    pub(crate) id: String,
    pub(crate) properties: Properties,
    pub(crate) next: Option<String>,
    pub(crate) container: Option<Scope>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new(index: NodeId, id: String, kind: NodeKind) -> Self {
        Self { index,
               id,
               properties: Properties::new(),
               next: None,
               container: None,
               kind }
    }

    pub fn index(&self) -> NodeId {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    /// Contenedor propietario. Siempre presente en un `Job` construido.
    pub fn container(&self) -> Option<Scope> {
        self.container
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Steps, flows y splits pueden encadenarse; las decisiones no pueden ser
    /// el primer elemento de un contenedor.
    pub fn is_chainable(&self) -> bool {
        !matches!(self.kind, NodeKind::Decision(_))
    }

    pub fn is_step(&self) -> bool {
        matches!(self.kind, NodeKind::Batchlet(_) | NodeKind::Chunk(_))
    }

    pub(crate) fn children(&self) -> Option<&Container> {
        match &self.kind {
            NodeKind::Flow(c) | NodeKind::Split(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Container> {
        match &mut self.kind {
            NodeKind::Flow(c) | NodeKind::Split(c) => Some(c),
            _ => None,
        }
    }

    /// Busca entre los artifacts propios del step (reader/processor/writer/
    /// algoritmo de checkpoint, batchlet, listeners y artifacts de partición)
    /// el que tiene el nombre lógico `reference`.
    pub fn artifact(&self, reference: &str) -> Result<&ArtifactRef, ArtifactError> {
        let found = match &self.kind {
            NodeKind::Batchlet(step) => step.artifacts().find(|a| a.reference == reference),
            NodeKind::Chunk(step) => step.artifacts().find(|a| a.reference == reference),
            NodeKind::Decision(d) if d.decider.reference == reference => Some(&d.decider),
            _ => None,
        };
        found.ok_or_else(|| ArtifactError::NotFound(reference.to_string()))
    }

    /// Listeners declarados en el step.
    pub fn listeners(&self) -> &[ArtifactRef] {
        match &self.kind {
            NodeKind::Batchlet(step) => &step.listeners,
            NodeKind::Chunk(step) => &step.listeners,
            _ => &[],
        }
    }
}

//! Definición inmutable de un job.
use serde::Serialize;

use super::{ArtifactRef, Container, Node, NodeId, Properties, Scope};

/// Grafo de job construido y validado por `JobBuilder`.
///
/// Los nodos viven en un arena (`nodes`); la raíz es un contenedor más. Tras
/// `build()` no hay forma de mutarlo, por eso el motor lo comparte como
/// `Arc<Job>` entre hilos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub(crate) id: String,
    pub(crate) properties: Properties,
    pub(crate) listeners: Vec<ArtifactRef>,
    pub(crate) root: Container,
    pub(crate) nodes: Vec<Node>,
    #[serde(skip)]
    pub(crate) definition_hash: String,
}

impl Job {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn listeners(&self) -> &[ArtifactRef] {
        &self.listeners
    }

    /// Hash blake3 de la forma canónica de la definición (más la versión del
    /// motor).
    pub fn definition_hash(&self) -> &str {
        &self.definition_hash
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Nodo por índice. Los `NodeId` sólo los emite el builder de este mismo
    /// job, así que el índice siempre es válido.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn container(&self, scope: Scope) -> Option<&Container> {
        match scope {
            Scope::Job => Some(&self.root),
            Scope::Node(n) => self.get(n).and_then(Node::children),
        }
    }

    /// Hijos directos de un contenedor en orden de declaración.
    pub fn children(&self, scope: Scope) -> impl Iterator<Item = &Node> + '_ {
        self.container(scope).into_iter().flat_map(|c| c.ids()).map(move |id| self.node(id))
    }

    /// Primer Step/Flow/Split del contenedor; `None` si no hay ninguno.
    pub fn first_chainable(&self, scope: Scope) -> Option<&Node> {
        self.children(scope).find(|n| n.is_chainable())
    }

    /// Hermano con id `id` dentro de `scope`.
    pub fn find(&self, scope: Scope, id: &str) -> Option<&Node> {
        self.container(scope).and_then(|c| c.get(id)).map(|n| self.node(n))
    }

    /// Nodo nombrado por `next`, buscado entre los hermanos de `node`.
    pub fn resolve_next(&self, node: &Node) -> Option<&Node> {
        let next = node.next()?;
        self.find(node.container()?, next)
    }

    /// Todos los steps del grafo, en orden del arena.
    pub fn steps(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.is_step())
    }

    /// Primer step con ese id en cualquier nivel del grafo.
    pub fn find_step(&self, id: &str) -> Option<&Node> {
        self.steps().find(|n| n.id() == id)
    }

    /// Nombre legible de un contenedor, para mensajes de error y logs.
    pub fn scope_name(&self, scope: Scope) -> &str {
        match scope {
            Scope::Job => &self.id,
            Scope::Node(n) => self.get(n).map(Node::id).unwrap_or("?"),
        }
    }
}

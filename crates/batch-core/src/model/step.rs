//! Definiciones de steps hoja: batchlet y chunk.
use serde::{Deserialize, Serialize};

use crate::constants::UNLIMITED;
use crate::errors::GraphBuildError;

use super::{ArtifactRef, PartitionConfig};

/// Step de invocación única: un batchlet con `process()` y `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchletStep {
    pub batchlet: ArtifactRef,
    #[serde(default)]
    pub listeners: Vec<ArtifactRef>,
    #[serde(default)]
    pub partition: Option<PartitionConfig>,
}

impl BatchletStep {
    pub fn new(batchlet: impl Into<ArtifactRef>) -> Self {
        Self { batchlet: batchlet.into(),
               listeners: Vec::new(),
               partition: None }
    }

    pub fn listener(mut self, listener: impl Into<ArtifactRef>) -> Self {
        self.listeners.push(listener.into());
        self
    }

    pub fn partitioned(mut self, partition: PartitionConfig) -> Self {
        self.partition = Some(partition);
        self
    }

    pub(crate) fn validate(&self, node: &str) -> Result<(), GraphBuildError> {
        require_ref(node, "batchlet", &self.batchlet)?;
        for l in &self.listeners {
            require_ref(node, "listener", l)?;
        }
        if let Some(p) = &self.partition {
            p.validate(node)?;
        }
        Ok(())
    }

    pub(crate) fn artifacts(&self) -> impl Iterator<Item = &ArtifactRef> {
        std::iter::once(&self.batchlet).chain(self.listeners.iter())
                                       .chain(self.partition.iter().flat_map(|p| p.artifacts()))
    }
}

/// Política que decide cuándo cerrar un intervalo de checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CheckpointPolicy {
    /// Cada `commit_interval` items procesados.
    #[default]
    Item,
    /// Cada `commit_interval` segundos de reloj.
    Time,
    /// Delegado por completo a un artifact `CheckpointAlgorithm`.
    Custom(ArtifactRef),
}

/// Step orientado a chunks: reader -> processor -> writer con checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStep {
    pub reader: ArtifactRef,
    #[serde(default)]
    pub processor: Option<ArtifactRef>,
    pub writer: ArtifactRef,
    #[serde(default)]
    pub checkpoint_policy: CheckpointPolicy,
    /// Items por checkpoint (ITEM) o segundos (TIME). Ignorado con CUSTOM.
    pub commit_interval: u32,
    /// `None` = default según política; `Some(0)` = escribir cada item.
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Reintentos tras el primer intento; -1 = sin límite.
    pub retry_limit: i64,
    /// Items cuyo procesamiento falla que se pueden saltar; -1 = sin límite.
    pub skip_limit: i64,
    #[serde(default)]
    pub listeners: Vec<ArtifactRef>,
    #[serde(default)]
    pub partition: Option<PartitionConfig>,
}

impl ChunkStep {
    pub fn new(reader: impl Into<ArtifactRef>, writer: impl Into<ArtifactRef>) -> Self {
        Self { reader: reader.into(),
               processor: None,
               writer: writer.into(),
               checkpoint_policy: CheckpointPolicy::Item,
               commit_interval: 10,
               buffer_size: None,
               retry_limit: UNLIMITED,
               skip_limit: 0,
               listeners: Vec::new(),
               partition: None }
    }

    pub fn processor(mut self, processor: impl Into<ArtifactRef>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    pub fn checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = policy;
        self
    }

    pub fn commit_interval(mut self, interval: u32) -> Self {
        self.commit_interval = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn retry_limit(mut self, limit: i64) -> Self {
        self.retry_limit = limit;
        self
    }

    pub fn skip_limit(mut self, limit: i64) -> Self {
        self.skip_limit = limit;
        self
    }

    pub fn listener(mut self, listener: impl Into<ArtifactRef>) -> Self {
        self.listeners.push(listener.into());
        self
    }

    pub fn partitioned(mut self, partition: PartitionConfig) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Tamaño de buffer efectivo: el declarado, o `commit_interval` bajo ITEM,
    /// o `default_size` en otro caso.
    pub fn effective_buffer_size(&self, default_size: usize) -> usize {
        match (self.buffer_size, &self.checkpoint_policy) {
            (Some(size), _) => size,
            (None, CheckpointPolicy::Item) => self.commit_interval as usize,
            (None, _) => default_size,
        }
    }

    pub(crate) fn validate(&self, node: &str) -> Result<(), GraphBuildError> {
        require_ref(node, "reader", &self.reader)?;
        require_ref(node, "writer", &self.writer)?;
        if let Some(p) = &self.processor {
            require_ref(node, "processor", p)?;
        }
        if let CheckpointPolicy::Custom(algorithm) = &self.checkpoint_policy {
            require_ref(node, "checkpoint-algorithm", algorithm)?;
        } else if self.commit_interval < 1 {
            return Err(invalid(node, "commit_interval", "must be >= 1"));
        }
        if self.retry_limit < UNLIMITED {
            return Err(invalid(node, "retry_limit", "must be >= 0 or -1 for unlimited"));
        }
        if self.skip_limit < UNLIMITED {
            return Err(invalid(node, "skip_limit", "must be >= 0 or -1 for unlimited"));
        }
        for l in &self.listeners {
            require_ref(node, "listener", l)?;
        }
        if let Some(p) = &self.partition {
            p.validate(node)?;
        }
        Ok(())
    }

    pub(crate) fn artifacts(&self) -> impl Iterator<Item = &ArtifactRef> {
        let algorithm = match &self.checkpoint_policy {
            CheckpointPolicy::Custom(a) => Some(a),
            _ => None,
        };
        std::iter::once(&self.reader).chain(self.processor.iter())
                                     .chain(std::iter::once(&self.writer))
                                     .chain(algorithm)
                                     .chain(self.listeners.iter())
                                     .chain(self.partition.iter().flat_map(|p| p.artifacts()))
    }
}

pub(crate) fn require_ref(node: &str, what: &str, artifact: &ArtifactRef) -> Result<(), GraphBuildError> {
    if artifact.reference.trim().is_empty() {
        return Err(GraphBuildError::MissingArtifact { node: node.to_string(),
                                                      what: what.to_string() });
    }
    Ok(())
}

pub(crate) fn invalid(node: &str, name: &str, reason: &str) -> GraphBuildError {
    GraphBuildError::InvalidParameter { node: node.to_string(),
                                        name: name.to_string(),
                                        reason: reason.to_string() }
}

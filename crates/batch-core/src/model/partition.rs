//! Configuración de steps particionados.
use serde::{Deserialize, Serialize};

use crate::errors::GraphBuildError;

use super::step::{invalid, require_ref};
use super::{ArtifactRef, Properties};

/// Plan de particiones: cuántas, con cuántos hilos y qué propiedades
/// sobreescribe cada una.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub partitions: usize,
    /// Concurrencia máxima; `None` = una por partición.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Overrides por partición (índice = número de partición). Puede tener
    /// menos entradas que particiones.
    #[serde(default)]
    pub partition_properties: Vec<Properties>,
}

impl PartitionPlan {
    pub fn new(partitions: usize) -> Self {
        Self { partitions,
               threads: None,
               partition_properties: Vec::new() }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_partition_properties(mut self, properties: Vec<Properties>) -> Self {
        self.partition_properties = properties;
        self
    }

    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or(self.partitions).max(1)
    }

    pub fn properties_for(&self, index: usize) -> Option<&Properties> {
        self.partition_properties.get(index)
    }

    pub(crate) fn validate(&self, node: &str) -> Result<(), GraphBuildError> {
        if self.partitions < 1 {
            return Err(invalid(node, "partitions", "must be >= 1"));
        }
        if matches!(self.threads, Some(0)) {
            return Err(invalid(node, "threads", "must be >= 1"));
        }
        Ok(())
    }
}

/// Origen del plan: declarado estáticamente u obtenido de un mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionSource {
    Plan(PartitionPlan),
    Mapper(ArtifactRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub source: PartitionSource,
    #[serde(default)]
    pub reducer: Option<ArtifactRef>,
    #[serde(default)]
    pub collector: Option<ArtifactRef>,
    #[serde(default)]
    pub analyzer: Option<ArtifactRef>,
}

impl PartitionConfig {
    pub fn plan(plan: PartitionPlan) -> Self {
        Self::from_source(PartitionSource::Plan(plan))
    }

    pub fn mapper(mapper: impl Into<ArtifactRef>) -> Self {
        Self::from_source(PartitionSource::Mapper(mapper.into()))
    }

    fn from_source(source: PartitionSource) -> Self {
        Self { source,
               reducer: None,
               collector: None,
               analyzer: None }
    }

    pub fn reducer(mut self, reducer: impl Into<ArtifactRef>) -> Self {
        self.reducer = Some(reducer.into());
        self
    }

    pub fn collector(mut self, collector: impl Into<ArtifactRef>) -> Self {
        self.collector = Some(collector.into());
        self
    }

    pub fn analyzer(mut self, analyzer: impl Into<ArtifactRef>) -> Self {
        self.analyzer = Some(analyzer.into());
        self
    }

    pub(crate) fn validate(&self, node: &str) -> Result<(), GraphBuildError> {
        match &self.source {
            PartitionSource::Plan(plan) => plan.validate(node)?,
            PartitionSource::Mapper(mapper) => require_ref(node, "partition-mapper", mapper)?,
        }
        for (what, art) in [("partition-reducer", &self.reducer),
                            ("partition-collector", &self.collector),
                            ("partition-analyzer", &self.analyzer)]
        {
            if let Some(a) = art {
                require_ref(node, what, a)?;
            }
        }
        Ok(())
    }

    pub(crate) fn artifacts(&self) -> impl Iterator<Item = &ArtifactRef> {
        let mapper = match &self.source {
            PartitionSource::Mapper(m) => Some(m),
            PartitionSource::Plan(_) => None,
        };
        mapper.into_iter()
              .chain(self.reducer.iter())
              .chain(self.collector.iter())
              .chain(self.analyzer.iter())
    }
}

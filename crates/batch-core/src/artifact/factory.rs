//! Factory de artifacts.
//!
//! El motor no sabe cómo se construye un artifact: entrega a la factory el
//! nombre lógico, la capacidad pedida y los contextos, y recibe una
//! instancia. `RegistryArtifactFactory` es la implementación por nombre
//! (closures registradas) que usan los tests y el CLI.
use std::sync::Arc;

use dashmap::DashMap;

use crate::context::{JobContext, StepContext};
use crate::errors::ArtifactError;
use crate::model::{ArtifactRef, Properties};

use super::{ArtifactInstance, Capability};

/// Todo lo que la factory sabe sobre el artifact que tiene que crear.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRequest<'a> {
    pub artifact: &'a ArtifactRef,
    pub capability: Capability,
    pub job: &'a JobContext,
    pub step: Option<&'a StepContext>,
}

impl<'a> ArtifactRequest<'a> {
    pub fn reference(&self) -> &'a str {
        &self.artifact.reference
    }

    /// Propiedades propias del artifact (sustituidas si las hay).
    pub fn properties(&self) -> &'a Properties {
        self.artifact.effective_properties()
    }

    /// Busca `key` en el artifact, luego en el step (con overrides de
    /// partición) y por último en el job.
    pub fn property(&self, key: &str) -> Option<&'a str> {
        self.properties()
            .get(key)
            .or_else(|| self.step.and_then(|s| s.properties().get(key)))
            .or_else(|| self.job.properties().get(key))
            .map(String::as_str)
    }
}

pub trait ArtifactFactory: Send + Sync {
    fn create(&self, request: &ArtifactRequest<'_>) -> Result<ArtifactInstance, ArtifactError>;

    fn destroy(&self, _instance: &ArtifactInstance) -> Result<(), ArtifactError> {
        Ok(())
    }
}

type Constructor = Arc<dyn Fn(&ArtifactRequest<'_>) -> Result<ArtifactInstance, ArtifactError> + Send + Sync>;

/// Factory basada en un registro nombre -> constructor.
#[derive(Default, Clone)]
pub struct RegistryArtifactFactory {
    constructors: Arc<DashMap<String, Constructor>>,
}

impl RegistryArtifactFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza) el constructor de `reference`.
    pub fn register<F>(&self, reference: impl Into<String>, constructor: F) -> &Self
        where F: Fn(&ArtifactRequest<'_>) -> Result<ArtifactInstance, ArtifactError> + Send + Sync + 'static
    {
        self.constructors.insert(reference.into(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.constructors.contains_key(reference)
    }

    pub fn references(&self) -> Vec<String> {
        let mut out: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }
}

impl ArtifactFactory for RegistryArtifactFactory {
    fn create(&self, request: &ArtifactRequest<'_>) -> Result<ArtifactInstance, ArtifactError> {
        // clonar el Arc y soltar el guard antes de construir
        let constructor = self.constructors
                              .get(request.reference())
                              .map(|e| e.value().clone())
                              .ok_or_else(|| ArtifactError::NotFound(request.reference().to_string()))?;
        constructor(request)
    }
}

impl std::fmt::Debug for RegistryArtifactFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryArtifactFactory").field("references", &self.references()).finish()
    }
}

//! Ámbito de vida de los artifacts de un job o de un step.
use std::sync::Arc;

use log::warn;

use crate::context::{JobContext, StepContext};
use crate::errors::ArtifactError;
use crate::model::ArtifactRef;

use super::{ArtifactFactory, ArtifactInstance, ArtifactRequest, Capable};

/// Crea artifacts a través de la factory, los recuerda para búsquedas por
/// tipo y los destruye al cerrar el ámbito.
///
/// `release()` se llama explícitamente en cada salida del ámbito; si no se
/// llegó a llamar (panic en medio del step), `Drop` lo hace.
pub struct ArtifactContainer {
    factory: Arc<dyn ArtifactFactory>,
    created: Vec<(String, ArtifactInstance)>,
    released: bool,
}

impl ArtifactContainer {
    pub fn new(factory: Arc<dyn ArtifactFactory>) -> Self {
        Self { factory,
               created: Vec::new(),
               released: false }
    }

    /// Materializa `artifact` con la capacidad `T`.
    pub fn create<T: Capable>(&mut self,
                              artifact: &ArtifactRef,
                              job: &JobContext,
                              step: Option<&StepContext>)
                              -> Result<T, ArtifactError> {
        let request = ArtifactRequest { artifact,
                                        capability: T::CAPABILITY,
                                        job,
                                        step };
        let instance = self.factory.create(&request)?;
        let typed = T::from_instance(&instance);
        let actual = instance.capability();
        // se registra aunque no encaje: la factory debe poder destruirlo igual
        self.created.push((artifact.reference.clone(), instance));
        typed.ok_or_else(|| ArtifactError::CapabilityMismatch { reference: artifact.reference.clone(),
                                                                expected: T::CAPABILITY,
                                                                actual })
    }

    /// Todas las instancias creadas con capacidad `T`, en orden de creación.
    pub fn created<T: Capable>(&self) -> Vec<T> {
        self.created.iter().filter_map(|(_, i)| T::from_instance(i)).collect()
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Destruye todo lo creado. Idempotente; devuelve el primer error de
    /// la factory pero intenta destruir el resto igualmente.
    pub fn release(&mut self) -> Result<(), ArtifactError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut first_error = None;
        for (reference, instance) in self.created.drain(..) {
            if let Err(e) = self.factory.destroy(&instance) {
                warn!("destroy of artifact '{}' failed: {}", reference, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ArtifactContainer {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release();
        }
    }
}

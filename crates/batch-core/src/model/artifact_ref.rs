//! Referencias a artifacts declaradas en el grafo.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Mapa de propiedades string -> string. El orden no es semántico; `IndexMap`
/// sólo hace determinista la iteración.
pub type Properties = IndexMap<String, String>;

/// Artifact declarado en un nodo: nombre lógico + propiedades.
///
/// `substituted_properties` lo rellena el colaborador externo de sustitución
/// de parámetros; el motor sólo lo lee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub reference: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_properties: Option<Properties>,
}

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self { reference: reference.into(),
               properties: Properties::new(),
               substituted_properties: None }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_substituted(mut self, properties: Properties) -> Self {
        self.substituted_properties = Some(properties);
        self
    }

    /// Propiedades vistas por el artifact en runtime: las sustituidas si
    /// existen, si no las declaradas.
    pub fn effective_properties(&self) -> &Properties {
        self.substituted_properties.as_ref().unwrap_or(&self.properties)
    }
}

impl From<&str> for ArtifactRef {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

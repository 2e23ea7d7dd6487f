//! Compute units and layer references

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime families the instrumentation agent can wrap; the agent layer and
/// its exec wrapper are Node.js only
const INSTRUMENTABLE_RUNTIME_PREFIXES: &[&str] = &["nodejs"];

/// Identifier of one layer version in one region (ARN-like)
///
/// Equality is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerReference(pub String);

impl LayerReference {
    /// Create reference from its raw identifier
    #[inline]
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this layer is a version of the family named by `family`
    #[inline]
    #[must_use]
    pub fn belongs_to_family(&self, family: &str) -> bool {
        !family.is_empty() && self.0.contains(family)
    }
}

impl std::fmt::Display for LayerReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerReference {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for LayerReference {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Runtime identifier of a compute unit (e.g. `nodejs18.x`, `go1.x`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Runtime(pub String);

impl Runtime {
    /// Create runtime from its identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether the instrumentation agent can run inside this runtime
    ///
    /// Statically compiled and custom runtimes are excluded.
    #[must_use]
    pub fn supports_instrumentation(&self) -> bool {
        INSTRUMENTABLE_RUNTIME_PREFIXES
            .iter()
            .any(|prefix| self.0.starts_with(prefix))
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function-like deployable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnit {
    /// Unit name within the service
    pub id: String,
    /// Runtime the unit executes in
    pub runtime: Runtime,
    /// Attached layers, in attachment order
    #[serde(default)]
    pub layers: IndexSet<LayerReference>,
    /// Environment variables
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ComputeUnit {
    /// Create unit with no layers and an empty environment
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, runtime: Runtime) -> Self {
        Self {
            id: id.into(),
            runtime,
            layers: IndexSet::new(),
            environment: BTreeMap::new(),
        }
    }

    /// With an attached layer
    #[inline]
    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<LayerReference>) -> Self {
        self.layers.insert(layer.into());
        self
    }

    /// With an environment variable
    #[inline]
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Whether instrumentation may be applied to this unit
    #[inline]
    #[must_use]
    pub fn is_instrumentation_supported(&self) -> bool {
        self.runtime.supports_instrumentation()
    }

    /// First attached layer of the given family
    #[must_use]
    pub fn family_layer(&self, family: &str) -> Option<&LayerReference> {
        self.layers.iter().find(|l| l.belongs_to_family(family))
    }
}

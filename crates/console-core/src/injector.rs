//! Instrumentation injector
//!
//! Merges the instrumentation layer into each supported compute unit and
//! sets the agent's environment variables. Injection is two-phase: a plan is
//! computed for every supported unit, and units are only touched once every
//! plan has succeeded. A failure leaves all units as they were.

use crate::config::{ConsoleConfig, MonitoringOverrides};
use crate::error::ConsoleError;
use console_model::{ComputeUnit, LayerReference};
use indexmap::IndexSet;
use serde::Serialize;

/// Variable carrying the serialized [`InstrumentationSettings`]
pub const SETTINGS_ENV_VAR: &str = "SLS_OTEL_USER_SETTINGS";

/// Variable pointing the runtime at the agent entrypoint
pub const EXEC_WRAPPER_ENV_VAR: &str = "AWS_LAMBDA_EXEC_WRAPPER";

/// Agent entrypoint inside the instrumentation layer
pub const EXEC_WRAPPER_PATH: &str = "/opt/otel-extension-internal-node/exec-wrapper.sh";

/// Settings read by the instrumentation agent at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationSettings {
    /// Organization id
    pub org_id: String,
    /// Ingestion token value
    pub ingestion_token: String,
    /// Service name
    pub service: String,
    /// Stage name
    pub stage: String,
    /// Per-capability overrides
    pub monitoring: MonitoringOverrides,
}

impl InstrumentationSettings {
    /// JSON value for [`SETTINGS_ENV_VAR`]
    ///
    /// # Errors
    /// `ConsoleError::Config` if the settings fail to serialize.
    pub fn to_env_value(&self) -> Result<String, ConsoleError> {
        serde_json::to_string(self)
            .map_err(|e| ConsoleError::Config(format!("cannot encode instrumentation settings: {e}")))
    }
}

/// Which instrumentation layer the units should carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerChoice {
    /// Replace any attached family layer with this one
    Latest(LayerReference),
    /// Registry unavailable: keep whatever family layer is attached
    KeepAttached {
        /// Why the registry could not be used
        reason: String,
        /// Whether the registry failure may clear up
        transient: bool,
    },
}

/// Outcome of an injection run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Units that were instrumented
    pub instrumented: Vec<String>,
    /// Units skipped for an unsupported runtime
    pub skipped: Vec<String>,
}

/// Layer merge and environment injection under a capacity limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injector {
    family: String,
    capacity: usize,
}

impl Injector {
    /// Create injector
    #[inline]
    #[must_use]
    pub fn new(family: impl Into<String>, capacity: usize) -> Self {
        Self {
            family: family.into(),
            capacity,
        }
    }

    /// Injector for the configured family and capacity
    #[inline]
    #[must_use]
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(config.layer_family.clone(), config.layer_capacity)
    }

    /// Capacity limit
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Layer family substring
    #[inline]
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Layers of `unit` with the family layer replaced by `layer`
    ///
    /// Existing order is kept and the new layer goes last.
    ///
    /// # Errors
    /// `ConsoleError::TooManyLayers` if the result exceeds the capacity.
    pub fn merge_layers(
        &self,
        unit: &ComputeUnit,
        layer: &LayerReference,
    ) -> Result<IndexSet<LayerReference>, ConsoleError> {
        let mut merged: IndexSet<LayerReference> = unit
            .layers
            .iter()
            .filter(|l| !l.belongs_to_family(&self.family) && *l != layer)
            .cloned()
            .collect();
        merged.insert(layer.clone());
        self.check_capacity(unit, merged)
    }

    fn check_capacity(
        &self,
        unit: &ComputeUnit,
        layers: IndexSet<LayerReference>,
    ) -> Result<IndexSet<LayerReference>, ConsoleError> {
        if layers.len() > self.capacity {
            return Err(ConsoleError::TooManyLayers {
                unit: unit.id.clone(),
                count: layers.len(),
                limit: self.capacity,
            });
        }
        Ok(layers)
    }

    fn plan(
        &self,
        unit: &ComputeUnit,
        choice: &LayerChoice,
    ) -> Result<IndexSet<LayerReference>, ConsoleError> {
        match choice {
            LayerChoice::Latest(layer) => self.merge_layers(unit, layer),
            LayerChoice::KeepAttached { reason, transient } => {
                if unit.family_layer(&self.family).is_none() {
                    return Err(ConsoleError::registry(reason.clone(), *transient));
                }
                tracing::warn!(
                    "Layer registry unavailable, keeping attached layer on {}: {}",
                    unit.id,
                    reason
                );
                self.check_capacity(unit, unit.layers.clone())
            }
        }
    }

    /// Instrument every supported unit
    ///
    /// Unsupported units are never touched.
    ///
    /// # Errors
    /// - `ConsoleError::TooManyLayers` if any unit would exceed the capacity
    /// - `ConsoleError::RegistryUnavailable` for [`LayerChoice::KeepAttached`]
    ///   when a supported unit has no family layer to keep
    pub fn inject(
        &self,
        units: &mut [ComputeUnit],
        choice: &LayerChoice,
        settings: &InstrumentationSettings,
    ) -> Result<InjectionReport, ConsoleError> {
        let settings_value = settings.to_env_value()?;
        let mut report = InjectionReport::default();

        let mut plans = Vec::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            if unit.is_instrumentation_supported() {
                plans.push((index, self.plan(unit, choice)?));
            } else {
                tracing::debug!(
                    "Skipping {}: runtime {} is not supported",
                    unit.id,
                    unit.runtime
                );
                report.skipped.push(unit.id.clone());
            }
        }

        for (index, layers) in plans {
            let unit = &mut units[index];
            unit.layers = layers;
            unit.environment
                .insert(SETTINGS_ENV_VAR.to_string(), settings_value.clone());
            unit.environment
                .insert(EXEC_WRAPPER_ENV_VAR.to_string(), EXEC_WRAPPER_PATH.to_string());
            tracing::debug!("Instrumented {} ({} layers)", unit.id, unit.layers.len());
            report.instrumented.push(unit.id.clone());
        }

        tracing::info!(
            "Console instrumentation applied to {} function(s), {} skipped",
            report.instrumented.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

//! Console integration configuration
//!
//! The integration reads two things from the service definition:
//! - the `console` key, either a flag (`console: true`) or a map of options
//! - the `functions` map, from which compute units are built
//!
//! ```yaml
//! service: orders
//! org: acme
//! provider:
//!   stage: dev
//!   region: us-east-1
//!   runtime: nodejs18.x
//! console:
//!   monitoring:
//!     logs:
//!       disabled: true
//! functions:
//!   api:
//!     handler: index.handler
//!   worker:
//!     runtime: go1.x
//! ```

use crate::error::ConsoleError;
use console_model::{ComputeUnit, LayerReference, Runtime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Platform limit on layers per compute unit
pub const DEFAULT_LAYER_CAPACITY: usize = 5;

/// Name fragment shared by every version of the instrumentation layer
pub const DEFAULT_LAYER_FAMILY: &str = "sls-otel-extension-node";

/// Runtime assumed when neither the function nor the provider names one
pub const DEFAULT_RUNTIME: &str = "nodejs18.x";

/// Default account API base URL
pub const DEFAULT_ACCOUNT_API_URL: &str = "https://core.serverless.com/api";

/// Default layer registry document
pub const DEFAULT_LAYER_REGISTRY_URL: &str =
    "https://sls-layers-registry.s3.amazonaws.com/sls-otel-extension-node.json";

/// Environment variable carrying the account access key
pub const ACCESS_KEY_ENV: &str = "SERVERLESS_ACCESS_KEY";

/// Environment variable overriding the account API URL
pub const ACCOUNT_API_URL_ENV: &str = "SLS_CONSOLE_API_URL";

/// Environment variable overriding the layer registry URL
pub const LAYER_REGISTRY_URL_ENV: &str = "SLS_CONSOLE_LAYER_REGISTRY_URL";

/// On/off switch for one monitoring capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySwitch {
    /// Capability turned off
    pub disabled: bool,
}

/// Per-capability monitoring overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringOverrides {
    /// Log capture
    pub logs: CapabilitySwitch,
    /// Request payload capture
    pub request: CapabilitySwitch,
    /// Response payload capture
    pub response: CapabilitySwitch,
}

/// Console integration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConsoleSetting", rename_all = "camelCase")]
pub struct ConsoleConfig {
    /// Integration requested
    pub enabled: bool,
    /// Monitoring overrides passed to the agent
    pub monitoring: MonitoringOverrides,
    /// Pin a registry version instead of the latest
    pub layer_version: Option<String>,
    /// Maximum layers per unit
    pub layer_capacity: usize,
    /// Name fragment identifying instrumentation layers
    pub layer_family: String,
}

impl ConsoleConfig {
    /// Enabled configuration with defaults
    #[inline]
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Disabled configuration
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// With monitoring overrides
    #[inline]
    #[must_use]
    pub fn with_monitoring(mut self, monitoring: MonitoringOverrides) -> Self {
        self.monitoring = monitoring;
        self
    }

    /// With pinned layer version
    #[inline]
    #[must_use]
    pub fn with_layer_version(mut self, version: impl Into<String>) -> Self {
        self.layer_version = Some(version.into());
        self
    }

    /// With layer capacity
    #[inline]
    #[must_use]
    pub fn with_layer_capacity(mut self, capacity: usize) -> Self {
        self.layer_capacity = capacity;
        self
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            monitoring: MonitoringOverrides::default(),
            layer_version: None,
            layer_capacity: DEFAULT_LAYER_CAPACITY,
            layer_family: DEFAULT_LAYER_FAMILY.to_string(),
        }
    }
}

/// Accepted shapes of the `console` key
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConsoleSetting {
    Flag(bool),
    Options(ConsoleOptions),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConsoleOptions {
    enabled: Option<bool>,
    monitoring: MonitoringOverrides,
    layer_version: Option<String>,
    layer_capacity: Option<usize>,
    layer_family: Option<String>,
}

impl From<ConsoleSetting> for ConsoleConfig {
    fn from(setting: ConsoleSetting) -> Self {
        match setting {
            ConsoleSetting::Flag(enabled) => Self {
                enabled,
                ..Self::default()
            },
            // A map counts as opting in unless it says otherwise.
            ConsoleSetting::Options(options) => Self {
                enabled: options.enabled.unwrap_or(true),
                monitoring: options.monitoring,
                layer_version: options.layer_version,
                layer_capacity: options.layer_capacity.unwrap_or(DEFAULT_LAYER_CAPACITY),
                layer_family: options
                    .layer_family
                    .unwrap_or_else(|| DEFAULT_LAYER_FAMILY.to_string()),
            },
        }
    }
}

/// Remote endpoints and credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Account API base URL
    pub account_api_url: String,
    /// Layer registry document URL
    pub layer_registry_url: String,
    /// Account access key
    pub access_key: Option<String>,
}

impl Endpoints {
    /// Defaults overridden by the process environment
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            account_api_url: std::env::var(ACCOUNT_API_URL_ENV)
                .unwrap_or(defaults.account_api_url),
            layer_registry_url: std::env::var(LAYER_REGISTRY_URL_ENV)
                .unwrap_or(defaults.layer_registry_url),
            access_key: std::env::var(ACCESS_KEY_ENV).ok().filter(|k| !k.is_empty()),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            account_api_url: DEFAULT_ACCOUNT_API_URL.to_string(),
            layer_registry_url: DEFAULT_LAYER_REGISTRY_URL.to_string(),
            access_key: None,
        }
    }
}

/// Provider block of the service definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderSettings {
    /// Stage name
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Region
    #[serde(default = "default_region")]
    pub region: String,
    /// Service-wide runtime
    #[serde(default)]
    pub runtime: Option<String>,
}

fn default_stage() -> String {
    "dev".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// One entry of the `functions` map
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDefinition {
    /// Runtime override
    #[serde(default)]
    pub runtime: Option<String>,
    /// Attached layers
    #[serde(default)]
    pub layers: Vec<String>,
    /// Environment variables
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// The parts of a service definition the integration reads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceDefinition {
    /// Service name
    pub service: String,
    /// Organization name
    #[serde(default)]
    pub org: Option<String>,
    /// Provider settings
    pub provider: ProviderSettings,
    /// Console settings
    #[serde(default)]
    pub console: Option<ConsoleConfig>,
    /// Functions by name
    #[serde(default)]
    pub functions: IndexMap<String, FunctionDefinition>,
}

impl ServiceDefinition {
    /// Parse a YAML service definition
    ///
    /// # Errors
    /// `ConsoleError::Config` on invalid YAML or missing required keys.
    pub fn from_yaml(source: &str) -> Result<Self, ConsoleError> {
        serde_yaml::from_str(source)
            .map_err(|e| ConsoleError::Config(format!("invalid service definition: {e}")))
    }

    /// Console settings, disabled when the key is absent
    #[must_use]
    pub fn console_config(&self) -> ConsoleConfig {
        self.console.clone().unwrap_or_default()
    }

    /// Compute units in declaration order
    #[must_use]
    pub fn compute_units(&self) -> Vec<ComputeUnit> {
        self.functions
            .iter()
            .map(|(name, function)| {
                let runtime = function
                    .runtime
                    .as_deref()
                    .or(self.provider.runtime.as_deref())
                    .unwrap_or(DEFAULT_RUNTIME);
                let mut unit = ComputeUnit::new(name.clone(), Runtime::new(runtime));
                unit.layers = function
                    .layers
                    .iter()
                    .map(|l| LayerReference::new(l.clone()))
                    .collect();
                unit.environment = function.environment.clone();
                unit
            })
            .collect()
    }
}

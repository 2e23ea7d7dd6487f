//! Console Core - deployment-time observability console integration
//!
//! Runs inside the package/deploy/rollback/remove workflow of a deployment
//! tool and:
//! - Decides whether the console integration applies to the run
//! - Manages the ingestion token of the organization
//! - Injects the instrumentation layer and settings into supported functions
//! - Rejects deployments whose recorded state disagrees with the current run
//!
//! # Example
//!
//! ```rust,ignore
//! use console_core::{ConsoleIntegration, Endpoints, RunContext, ServiceDefinition};
//! use console_model::Command;
//!
//! # async fn example(yaml: &str) -> Result<(), console_core::ConsoleError> {
//! let definition = ServiceDefinition::from_yaml(yaml)?;
//! let mut units = definition.compute_units();
//! let context = RunContext::from_definition(Command::Deploy, &definition, ".".as_ref());
//!
//! let mut console = ConsoleIntegration::from_endpoints(
//!     definition.console_config(),
//!     context,
//!     &Endpoints::from_env(),
//! )?;
//! if console.initialize(&units) {
//!     console.pre_package(&mut units).await?;
//!     // upload artifacts
//!     console.post_deploy(None).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod context;
pub mod error;
pub mod injector;
pub mod orchestrator;
pub mod reconciler;
pub mod resolver;
pub mod state_store;
pub mod tokens;

pub use config::{
    CapabilitySwitch, ConsoleConfig, Endpoints, FunctionDefinition, MonitoringOverrides,
    ProviderSettings, ServiceDefinition, DEFAULT_LAYER_CAPACITY, DEFAULT_LAYER_FAMILY,
};
pub use context::RunContext;
pub use error::ConsoleError;
pub use injector::{
    InjectionReport, Injector, InstrumentationSettings, LayerChoice, EXEC_WRAPPER_ENV_VAR,
    EXEC_WRAPPER_PATH, SETTINGS_ENV_VAR,
};
pub use orchestrator::ConsoleIntegration;
pub use reconciler::{find_mismatch, reconcile, CurrentIntent, Mismatch, MismatchKind};
pub use resolver::LayerResolver;
pub use state_store::{FileStateStore, StateError, StateStore, STATE_FILE_NAME};
pub use tokens::TokenManager;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the console integration
    pub use crate::{
        ConsoleConfig, ConsoleError, ConsoleIntegration, Endpoints, RunContext,
        ServiceDefinition, StateStore,
    };
    pub use console_model::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

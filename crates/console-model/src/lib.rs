//! Console Model - shared types for the deployment console integration
//!
//! Defines the records exchanged between the integration components:
//! - Organizations and ingestion tokens (with their lifecycle states)
//! - Compute units and the layer references attached to them
//! - The persisted deployment console state
//! - Lifecycle commands and check directions
//!
//! # Example
//!
//! ```rust
//! use console_model::{ComputeUnit, Runtime};
//!
//! let unit = ComputeUnit::new("api", Runtime::new("nodejs18.x"));
//! assert!(unit.is_instrumentation_supported());
//! ```

#![warn(unreachable_pub)]

pub mod command;
pub mod org;
pub mod state;
pub mod token;
pub mod unit;

pub use command::{Command, Direction};
pub use org::Organization;
pub use state::{DeploymentConsoleState, PersistedState, SUPPORTED_SCHEMA_VERSION};
pub use token::{
    allowed_transitions, redact, validate_transition, DeactivationMode, IngestionToken, TokenStatus,
    TokenTransitionError,
};
pub use unit::{ComputeUnit, LayerReference, Runtime};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the console model
    pub use crate::{
        Command, ComputeUnit, DeactivationMode, DeploymentConsoleState, Direction,
        IngestionToken, LayerReference, Organization, PersistedState, Runtime, TokenStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

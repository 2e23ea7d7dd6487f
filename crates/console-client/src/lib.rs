//! Console Client - external collaborators of the console integration
//!
//! Two remote services are consumed:
//! - The **account API**, which resolves organizations and manages
//!   ingestion tokens ([`AccountApi`], [`HttpAccountApi`])
//! - The **layer registry feed**, a JSON document mapping
//!   `region → version → layer reference` ([`LayerFeed`], [`HttpLayerFeed`])
//!
//! Both are traits so the integration components receive them by injection;
//! the HTTP implementations are the production wiring.
//!
//! Nothing here retries. Failures are classified through
//! [`ClientError::is_transient`] and left to the caller.

#![warn(unreachable_pub)]

pub mod account;
pub mod error;
pub mod registry;

pub use account::{AccessToken, AccountApi, HttpAccountApi, OrgResponse, TokenResponse};
pub use error::{ClientError, ClientResult};
pub use registry::{HttpLayerFeed, LayerFeed, LayerIndex};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

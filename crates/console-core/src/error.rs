//! Error types for the console integration
//!
//! Every fatal condition aborts the current lifecycle phase. Each variant
//! maps to a stable code through [`ConsoleError::code`], which is what the
//! host tool shows and what callers match on.

use crate::reconciler::Mismatch;
use crate::state_store::StateError;
use console_client::ClientError;
use console_model::TokenTransitionError;

/// Main console integration error type
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// Integration requested without a usable account credential
    #[error(
        "console integration requires an account credential; \
         set SERVERLESS_ACCESS_KEY or log in before deploying"
    )]
    NotAuthenticated,

    /// Merged layer list would exceed the platform limit
    #[error(
        "cannot set up console for function '{unit}': it would carry {count} layers, \
         the limit is {limit}"
    )]
    TooManyLayers {
        /// Compute unit id
        unit: String,
        /// Layer count after merging
        count: usize,
        /// Capacity limit
        limit: usize,
    },

    /// Persisted deployment state disagrees with the current run
    #[error(transparent)]
    Mismatch(#[from] Mismatch),

    /// Layer registry feed missing, malformed or unreachable
    #[error("layer registry unavailable: {reason}")]
    RegistryUnavailable {
        /// What went wrong
        reason: String,
        /// Whether a later attempt may succeed
        transient: bool,
    },

    /// Account API call failed
    #[error("account API error: {0}")]
    AccountApi(#[source] ClientError),

    /// Reading or writing the persisted state failed
    #[error("deployment state error: {0}")]
    State(#[from] StateError),

    /// Invalid service or console configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Token lifecycle violated
    #[error("token lifecycle error: {0}")]
    TokenTransition(#[from] TokenTransitionError),

    /// Lifecycle phase invoked out of order
    #[error("phase '{phase}' requires {requirement}")]
    PhaseOrder {
        /// Phase that was invoked
        phase: &'static str,
        /// What had to happen first
        requirement: &'static str,
    },
}

impl ConsoleError {
    /// Stable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "CONSOLE_NOT_AUTHENTICATED",
            Self::TooManyLayers { .. } => "TOO_MANY_LAYERS_TO_SETUP_CONSOLE",
            Self::Mismatch(mismatch) => mismatch.code(),
            Self::RegistryUnavailable { .. } => "CONSOLE_REGISTRY_UNAVAILABLE",
            Self::AccountApi(_) => "CONSOLE_ACCOUNT_API_ERROR",
            Self::State(_) => "CONSOLE_STATE_ERROR",
            Self::Config(_) => "CONSOLE_CONFIGURATION_ERROR",
            Self::TokenTransition(_) => "CONSOLE_INVALID_TOKEN_TRANSITION",
            Self::PhaseOrder { .. } => "CONSOLE_PHASE_ORDER",
        }
    }

    /// Whether the failure came from a remote service and may clear up
    ///
    /// Nothing in this crate retries; the classification is for the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AccountApi(e) => e.is_transient(),
            Self::RegistryUnavailable { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Whether the error is one of the consistency-check failures
    #[inline]
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch(_))
    }

    pub(crate) fn registry(reason: impl Into<String>, transient: bool) -> Self {
        Self::RegistryUnavailable {
            reason: reason.into(),
            transient,
        }
    }
}

impl From<ClientError> for ConsoleError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotAuthenticated => Self::NotAuthenticated,
            other => Self::AccountApi(other),
        }
    }
}

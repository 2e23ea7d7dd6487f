//! Ingestion tokens and their lifecycle
//!
//! A token moves through a small state machine:
//!
//! ```text
//! Existing ────┐
//!              ├──► Activated ──► Deactivated
//! NewlyIssued ─┘      │  ▲
//!                     └──┘ re-activation is idempotent
//! ```
//!
//! Nothing leaves `Deactivated`.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an ingestion token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenStatus {
    /// Token already existed for the organization
    Existing,
    /// Token was issued during this run
    NewlyIssued,
    /// Token accepted for ingestion
    Activated,
    /// Token revoked
    Deactivated,
}

impl TokenStatus {
    /// Whether the token may still be used for ingestion
    #[inline]
    #[must_use]
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::Deactivated)
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Existing => "existing",
            Self::NewlyIssued => "newly-issued",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
        };
        f.write_str(label)
    }
}

/// Rejected token state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal token transition: {from} -> {to}")]
pub struct TokenTransitionError {
    /// State the token was in
    pub from: TokenStatus,
    /// State that was requested
    pub to: TokenStatus,
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: TokenStatus) -> Vec<TokenStatus> {
    use TokenStatus::{Activated, Deactivated, Existing, NewlyIssued};
    match from {
        Existing | NewlyIssued => vec![Activated, Deactivated],
        Activated => vec![Activated, Deactivated],
        Deactivated => vec![],
    }
}

/// Validates a token state transition.
///
/// # Errors
/// `TokenTransitionError` if `to` is not reachable from `from`.
pub fn validate_transition(from: TokenStatus, to: TokenStatus) -> Result<(), TokenTransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TokenTransitionError { from, to })
    }
}

/// Credential authorizing telemetry ingestion for one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionToken {
    /// Opaque token value
    pub value: String,
    /// Current lifecycle state
    pub status: TokenStatus,
}

impl IngestionToken {
    /// Create token in the given state
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>, status: TokenStatus) -> Self {
        Self {
            value: value.into(),
            status,
        }
    }

    /// Token that was already present for the organization
    #[inline]
    #[must_use]
    pub fn existing(value: impl Into<String>) -> Self {
        Self::new(value, TokenStatus::Existing)
    }

    /// Token issued during this run
    #[inline]
    #[must_use]
    pub fn newly_issued(value: impl Into<String>) -> Self {
        Self::new(value, TokenStatus::NewlyIssued)
    }

    /// Move the token to `to`, enforcing the lifecycle.
    ///
    /// # Errors
    /// `TokenTransitionError` when the transition is illegal; the token is
    /// left unchanged.
    pub fn transition(&mut self, to: TokenStatus) -> Result<(), TokenTransitionError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    /// Short, log-safe rendering of the value
    #[must_use]
    pub fn redacted(&self) -> String {
        redact(&self.value)
    }
}

/// Log-safe rendering of a token value: first four characters only
#[must_use]
pub fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}***")
}

/// Which tokens a deactivation call revokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeactivationMode {
    /// Exactly the given token
    Single,
    /// Every token of the organization except the given one
    AllOthers,
    /// Every token of the organization
    All,
}

impl DeactivationMode {
    /// Whether the mode needs a reference token
    #[inline]
    #[must_use]
    pub fn needs_token(self) -> bool {
        !matches!(self, Self::All)
    }
}

//! Consistency checks between persisted and intended deployment state
//!
//! Checks run in a fixed order and the first failure wins, so the user gets
//! the most specific error:
//!
//! 1. schema version of the persisted console block
//! 2. organization
//! 3. region (deploy direction only)
//! 4. activation: console was active but the current run has it disabled
//!
//! No persisted state, or a persisted state without a console block, skips
//! every check.

use console_model::{Direction, PersistedState};

/// Which field differed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchKind {
    /// Console block layout version
    Schema,
    /// Organization id
    Org,
    /// Deployment region
    Region,
    /// Integration on/off
    Activation,
}

/// A failed consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Field that differed
    pub kind: MismatchKind,
    /// Deploy or rollback
    pub direction: Direction,
    /// Value of the current run
    pub expected: String,
    /// Value found in the persisted state
    pub found: String,
}

impl Mismatch {
    /// Create mismatch
    #[must_use]
    pub fn new(
        kind: MismatchKind,
        direction: Direction,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            direction,
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Stable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match (self.kind, self.direction) {
            (MismatchKind::Schema, Direction::Deploy) => "CONSOLE_INTEGRATION_MISMATCH",
            (MismatchKind::Schema, Direction::Rollback) => "CONSOLE_INTEGRATION_MISMATCH_ROLLBACK",
            (MismatchKind::Org, Direction::Deploy) => "CONSOLE_ORG_MISMATCH",
            (MismatchKind::Org, Direction::Rollback) => "CONSOLE_ORG_MISMATCH_ROLLBACK",
            // Region is fixed by the stack being rolled back to; both map here.
            (MismatchKind::Region, _) => "CONSOLE_REGION_MISMATCH",
            (MismatchKind::Activation, Direction::Deploy) => "CONSOLE_ACTIVATION_MISMATCH",
            (MismatchKind::Activation, Direction::Rollback) => {
                "CONSOLE_ACTIVATION_MISMATCH_ROLLBACK"
            }
        }
    }
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self.direction {
            Direction::Deploy => "Cannot deploy service",
            Direction::Rollback => "Cannot roll back service",
        };
        let (expected, found) = (&self.expected, &self.found);
        match self.kind {
            MismatchKind::Schema => write!(
                f,
                "{action}: artifact was built with console integration schema {found}, \
                 this version supports {expected}. Package the service again"
            ),
            MismatchKind::Org => write!(
                f,
                "{action}: artifact was built for organization {found}, \
                 the service is configured for {expected}"
            ),
            MismatchKind::Region => write!(
                f,
                "{action}: artifact was built for region {found}, deploying to {expected}"
            ),
            MismatchKind::Activation => write!(
                f,
                "{action}: artifact was built with console integration enabled, \
                 but it is disabled for this run"
            ),
        }
    }
}

impl std::error::Error for Mismatch {}

/// What the current run intends to deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentIntent<'a> {
    /// Schema version this implementation writes
    pub schema_version: &'a str,
    /// Resolved organization id; `None` when the integration is disabled
    pub org_id: Option<&'a str>,
    /// Target region
    pub region: &'a str,
    /// Whether the integration is enabled for the run
    pub enabled: bool,
}

/// First failing check, if any
#[must_use]
pub fn find_mismatch(
    persisted: Option<&PersistedState>,
    current: &CurrentIntent<'_>,
    direction: Direction,
) -> Option<Mismatch> {
    let state = persisted?;
    let console = state.console.as_ref()?;

    if console.schema_version != current.schema_version {
        return Some(Mismatch::new(
            MismatchKind::Schema,
            direction,
            current.schema_version,
            &console.schema_version,
        ));
    }

    if let Some(org_id) = current.org_id {
        if console.org_id != org_id {
            return Some(Mismatch::new(
                MismatchKind::Org,
                direction,
                org_id,
                &console.org_id,
            ));
        }
    }

    if direction == Direction::Deploy && state.region != current.region {
        return Some(Mismatch::new(
            MismatchKind::Region,
            direction,
            current.region,
            &state.region,
        ));
    }

    if !current.enabled {
        return Some(Mismatch::new(
            MismatchKind::Activation,
            direction,
            "disabled",
            "enabled",
        ));
    }

    None
}

/// Run the ordered checks.
///
/// # Errors
/// The first [`Mismatch`] found.
pub fn reconcile(
    persisted: Option<&PersistedState>,
    current: &CurrentIntent<'_>,
    direction: Direction,
) -> Result<(), Mismatch> {
    match find_mismatch(persisted, current, direction) {
        Some(mismatch) => {
            tracing::warn!("Deployment state check failed: {}", mismatch.code());
            Err(mismatch)
        }
        None => Ok(()),
    }
}

//! Organization identity

use serde::{Deserialize, Serialize};

/// Tenant that owns ingestion tokens
///
/// `id` is opaque; it scopes tokens and instrumentation payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Organization {
    /// Human-facing name, as written in the service definition
    pub name: String,
    /// Resolved identifier
    pub id: String,
}

impl Organization {
    /// Create organization from a resolved name/id pair
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for Organization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

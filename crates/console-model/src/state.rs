//! Persisted deployment console state
//!
//! The record written when a service is packaged and read back on deploy and
//! rollback. A record is never edited in place; the next successful write
//! supersedes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version of the `console` block written by this implementation
pub const SUPPORTED_SCHEMA_VERSION: &str = "1";

/// Console block of the persisted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConsoleState {
    /// Layout version of this block
    pub schema_version: String,
    /// Ingestion token baked into the artifact
    #[serde(rename = "otelIngestionToken")]
    pub ingestion_token: String,
    /// Service name
    #[serde(rename = "service")]
    pub service_name: String,
    /// Stage name
    pub stage: String,
    /// Organization id
    pub org_id: String,
}

impl DeploymentConsoleState {
    /// Console block at the current schema version
    #[must_use]
    pub fn current(
        ingestion_token: impl Into<String>,
        service_name: impl Into<String>,
        stage: impl Into<String>,
        org_id: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: SUPPORTED_SCHEMA_VERSION.to_string(),
            ingestion_token: ingestion_token.into(),
            service_name: service_name.into(),
            stage: stage.into(),
            org_id: org_id.into(),
        }
    }
}

/// Deployment state record owned by the integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Service name
    pub service: String,
    /// Stage name
    pub stage: String,
    /// Region the artifact was built for
    pub region: String,
    /// Console block; absent when the integration was not used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<DeploymentConsoleState>,
    /// When the record was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_at: Option<DateTime<Utc>>,
}

impl PersistedState {
    /// Create record without a console block
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        stage: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            stage: stage.into(),
            region: region.into(),
            console: None,
            written_at: None,
        }
    }

    /// With console block
    #[inline]
    #[must_use]
    pub fn with_console(mut self, console: DeploymentConsoleState) -> Self {
        self.console = Some(console);
        self
    }

    /// Stamp the record with the current time
    #[inline]
    #[must_use]
    pub fn stamped(mut self) -> Self {
        self.written_at = Some(Utc::now());
        self
    }

    /// Whether the integration was active for this deployment
    #[inline]
    #[must_use]
    pub fn integration_active(&self) -> bool {
        self.console.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn console_block_wire_names() {
        let state = PersistedState::new("svc", "dev", "us-east-1")
            .with_console(DeploymentConsoleState::current("tok", "svc", "dev", "org-1"));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "service": "svc",
                "stage": "dev",
                "region": "us-east-1",
                "console": {
                    "schemaVersion": "1",
                    "otelIngestionToken": "tok",
                    "service": "svc",
                    "stage": "dev",
                    "orgId": "org-1"
                }
            })
        );
    }

    #[test]
    fn missing_console_block_reads_as_inactive() {
        let state: PersistedState = serde_json::from_value(serde_json::json!({
            "service": "svc",
            "stage": "dev",
            "region": "eu-west-1"
        }))
        .unwrap();

        assert!(!state.integration_active());
        assert!(state.written_at.is_none());
    }
}

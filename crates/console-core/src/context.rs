//! Run context
//!
//! Everything the integration needs to know about the current invocation,
//! passed explicitly to the orchestrator instead of read from process state.

use crate::config::ServiceDefinition;
use console_model::Command;
use std::path::{Path, PathBuf};

/// Default directory of packaged artifacts, relative to the service root
pub const DEFAULT_PACKAGE_DIR: &str = ".serverless";

/// The current deployment invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Lifecycle command being run
    pub command: Command,
    /// Service name
    pub service: String,
    /// Stage name
    pub stage: String,
    /// Target region
    pub region: String,
    /// Organization name, if the service names one
    pub org_name: Option<String>,
    /// Directory the packaged artifact is written to
    pub package_dir: PathBuf,
}

impl RunContext {
    /// Create context
    #[must_use]
    pub fn new(
        command: Command,
        service: impl Into<String>,
        stage: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            command,
            service: service.into(),
            stage: stage.into(),
            region: region.into(),
            org_name: None,
            package_dir: PathBuf::from(DEFAULT_PACKAGE_DIR),
        }
    }

    /// Context for `command` against a parsed service definition rooted at
    /// `service_dir`
    #[must_use]
    pub fn from_definition(command: Command, definition: &ServiceDefinition, service_dir: &Path) -> Self {
        Self {
            command,
            service: definition.service.clone(),
            stage: definition.provider.stage.clone(),
            region: definition.provider.region.clone(),
            org_name: definition.org.clone(),
            package_dir: service_dir.join(DEFAULT_PACKAGE_DIR),
        }
    }

    /// With organization name
    #[inline]
    #[must_use]
    pub fn with_org(mut self, name: impl Into<String>) -> Self {
        self.org_name = Some(name.into());
        self
    }

    /// With package directory
    #[inline]
    #[must_use]
    pub fn with_package_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.package_dir = dir.into();
        self
    }
}

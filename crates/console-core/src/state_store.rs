//! Deployment state store
//!
//! The persisted record lives next to the deployment artifact. A location is
//! the artifact directory: the package output directory on deploy, the
//! downloaded artifact directory on rollback.

use async_trait::async_trait;
use console_model::PersistedState;
use std::path::{Path, PathBuf};

/// File name of the record inside an artifact directory
pub const STATE_FILE_NAME: &str = "console-state.json";

/// Errors reading or writing persisted state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// IO failure
    #[error("io error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record exists but does not decode
    #[error("malformed state record at {path}: {message}")]
    Malformed {
        /// File involved
        path: PathBuf,
        /// Decoder message
        message: String,
    },
}

impl StateError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Read/write contract for the persisted deployment record
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record stored at `location`, `None` if there is none
    async fn read(&self, location: &Path) -> Result<Option<PersistedState>, StateError>;

    /// Replace the record at `location`
    async fn write(&self, location: &Path, state: &PersistedState) -> Result<(), StateError>;
}

/// JSON file per artifact directory
#[derive(Debug, Clone, Default)]
pub struct FileStateStore;

impl FileStateStore {
    /// Create store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Path of the record for `location`
    #[inline]
    #[must_use]
    pub fn record_path(location: &Path) -> PathBuf {
        location.join(STATE_FILE_NAME)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read(&self, location: &Path) -> Result<Option<PersistedState>, StateError> {
        let path = Self::record_path(location);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No deployment state at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(StateError::io(path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StateError::Malformed {
                path,
                message: e.to_string(),
            })
    }

    async fn write(&self, location: &Path, state: &PersistedState) -> Result<(), StateError> {
        tokio::fs::create_dir_all(location)
            .await
            .map_err(|e| StateError::io(location, e))?;

        let path = Self::record_path(location);
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state).map_err(|e| StateError::Malformed {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Write-then-rename so readers never see a half-written record.
        tokio::fs::write(&staging, content)
            .await
            .map_err(|e| StateError::io(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StateError::io(&path, e))?;

        tracing::debug!("Wrote deployment state to {}", path.display());
        Ok(())
    }
}

//! Client errors

use thiserror::Error;

/// Result alias for client calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors from the account API and the layer registry feed
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network/HTTP transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No usable credential, or the service rejected it
    #[error("not authenticated with the account API")]
    NotAuthenticated,

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Service returned an error response
    #[error("service error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Client was constructed with unusable settings
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Call was made with inconsistent arguments
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether the failure may succeed if repeated later
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

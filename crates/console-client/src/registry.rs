//! Layer registry feed
//!
//! The registry is a single JSON object stored under a well-known key:
//!
//! ```json
//! { "us-east-1": { "0.4.0": "arn:...:1", "0.5.0": "arn:...:2" } }
//! ```

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;

/// `region → version → layer reference`
pub type LayerIndex = BTreeMap<String, BTreeMap<String, String>>;

/// Source of the layer registry document
#[async_trait]
pub trait LayerFeed: Send + Sync + std::fmt::Debug {
    /// Fetch the registry document
    ///
    /// `Ok(None)` means the document does not exist; a document that exists
    /// but does not decode is [`ClientError::Malformed`].
    async fn fetch_index(&self) -> ClientResult<Option<LayerIndex>>;
}

/// reqwest-backed [`LayerFeed`] reading a public object URL
#[derive(Debug, Clone)]
pub struct HttpLayerFeed {
    client: Client,
    url: String,
}

impl HttpLayerFeed {
    /// Create feed reading the document at `url`
    ///
    /// # Errors
    /// `ClientError::Network` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Document URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LayerFeed for HttpLayerFeed {
    async fn fetch_index(&self) -> ClientResult<Option<LayerIndex>> {
        tracing::debug!("Fetching layer registry from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();

        // Object stores answer 403 rather than 404 for missing public keys.
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            tracing::warn!("Layer registry document missing ({})", status);
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let index: LayerIndex = serde_json::from_str(&body)?;
        Ok(Some(index))
    }
}

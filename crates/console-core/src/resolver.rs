//! Layer registry resolver
//!
//! The registry feed maps `region -> version -> layer reference`. The feed is
//! fetched once per resolver and shared by every lookup afterwards.

use crate::error::ConsoleError;
use console_client::{LayerFeed, LayerIndex};
use console_model::LayerReference;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Looks up instrumentation layer references for a region
#[derive(Debug)]
pub struct LayerResolver {
    feed: Arc<dyn LayerFeed>,
    index: OnceCell<Arc<LayerIndex>>,
}

impl LayerResolver {
    /// Create resolver over a registry feed
    #[inline]
    #[must_use]
    pub fn new(feed: Arc<dyn LayerFeed>) -> Self {
        Self {
            feed,
            index: OnceCell::new(),
        }
    }

    /// Layer reference for `region`
    ///
    /// `known_version` is preferred when the region lists it; otherwise the
    /// highest version wins. Versions compare as semver, with an optional
    /// leading `v` and missing minor/patch read as zero; entries that do not
    /// parse are ignored.
    ///
    /// # Errors
    /// `ConsoleError::RegistryUnavailable` when the feed is missing, malformed,
    /// unreachable, or has no usable entry for the region.
    pub async fn resolve_latest_layer(
        &self,
        region: &str,
        known_version: Option<&str>,
    ) -> Result<LayerReference, ConsoleError> {
        let index = self.index().await?;
        let versions = index.get(region).ok_or_else(|| {
            ConsoleError::registry(format!("no layers published for region {region}"), false)
        })?;

        if let Some(layer) = known_version.and_then(|v| versions.get(v)) {
            tracing::debug!("Using pinned instrumentation layer {}", layer);
            return Ok(LayerReference::new(layer.clone()));
        }

        let (version, layer) = highest_version(versions).ok_or_else(|| {
            ConsoleError::registry(format!("no valid layer versions for region {region}"), false)
        })?;
        tracing::debug!("Resolved instrumentation layer {} ({})", layer, version);
        Ok(LayerReference::new(layer.clone()))
    }

    async fn index(&self) -> Result<&Arc<LayerIndex>, ConsoleError> {
        self.index
            .get_or_try_init(|| async {
                tracing::debug!("Fetching layer registry");
                match self.feed.fetch_index().await {
                    Ok(Some(index)) => Ok(Arc::new(index)),
                    Ok(None) => Err(ConsoleError::registry("registry feed not found", false)),
                    Err(e) => Err(ConsoleError::registry(e.to_string(), e.is_transient())),
                }
            })
            .await
    }
}

fn highest_version(versions: &BTreeMap<String, String>) -> Option<(semver::Version, &String)> {
    versions
        .iter()
        .filter_map(|(raw, layer)| Some((parse_version(raw)?, layer)))
        .max_by(|a, b| a.0.cmp(&b.0))
}

/// Registry version key as semver
///
/// Short numeric keys (`"2"`, `"1.4"`) are padded with zero components.
fn parse_version(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim().strip_prefix('v').unwrap_or(raw.trim());
    if let Ok(version) = semver::Version::parse(raw) {
        return Some(version);
    }

    let parts = raw
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [major] => Some(semver::Version::new(*major, 0, 0)),
        [major, minor] => Some(semver::Version::new(*major, *minor, 0)),
        _ => None,
    }
}

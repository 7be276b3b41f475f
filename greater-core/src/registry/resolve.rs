//! Ref resolution
//!
//! Picks the ref to install from, in priority order: an explicit ref, the
//! project config, the remote latest-release pointer, and finally a
//! compiled-in fallback.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::LATEST_CACHE_KEY;
use super::{IndexErrorCause, LatestPointer, RegistryIndexCache, RegistryIndexError, LATEST_POINTER_PATH};

/// Ref used when nothing else resolves
pub const FALLBACK_REF: &str = "greater-v4.2.0";

/// TTL of the cached latest-release pointer (5 minutes)
pub const LATEST_TTL: Duration = Duration::from_secs(5 * 60);

/// Where a resolved ref came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefSource {
    Explicit,
    Config,
    Latest,
    Fallback,
}

impl std::fmt::Display for RefSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefSource::Explicit => "explicit",
            RefSource::Config => "config",
            RefSource::Latest => "latest",
            RefSource::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRef {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub source: RefSource,
}

/// A candidate wins only if it is non-empty and not the `latest` alias
fn concrete(candidate: Option<&str>) -> Option<&str> {
    candidate
        .map(str::trim)
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("latest"))
}

impl RegistryIndexCache {
    /// Resolve the ref to install from.
    ///
    /// Never fails: a failed latest-pointer lookup degrades to `fallback`.
    pub async fn resolve_ref(
        &self,
        explicit: Option<&str>,
        config_ref: Option<&str>,
        fallback: &str,
    ) -> ResolvedRef {
        if let Some(git_ref) = concrete(explicit) {
            return ResolvedRef {
                git_ref: git_ref.to_string(),
                source: RefSource::Explicit,
            };
        }

        if let Some(git_ref) = concrete(config_ref) {
            return ResolvedRef {
                git_ref: git_ref.to_string(),
                source: RefSource::Config,
            };
        }

        match self.fetch_latest_pointer().await {
            Ok(pointer) => {
                if let Some(git_ref) = concrete(Some(&pointer.git_ref)) {
                    return ResolvedRef {
                        git_ref: git_ref.to_string(),
                        source: RefSource::Latest,
                    };
                }
                warn!("Latest pointer does not name a concrete ref; using {}", fallback);
            }
            Err(e) => {
                warn!("Failed to resolve latest ref, using {}: {:#}", fallback, anyhow::Error::new(e));
            }
        }

        ResolvedRef {
            git_ref: fallback.to_string(),
            source: RefSource::Fallback,
        }
    }

    /// Read `registry/latest.json` from the default branch, cached for
    /// [`LATEST_TTL`]
    pub async fn fetch_latest_pointer(&self) -> Result<LatestPointer, RegistryIndexError> {
        let branch = self.default_branch.as_str();
        match self.read_entry::<LatestPointer>(LATEST_CACHE_KEY, branch) {
            Ok(Some(pointer)) => {
                debug!("Using cached latest pointer: {}", pointer.git_ref);
                return Ok(pointer);
            }
            Ok(None) => debug!("No valid cached latest pointer"),
            Err(e) => debug!("Failed to read cached latest pointer: {}", e),
        }

        let bytes = self
            .fetcher
            .fetch_remote_file(branch, LATEST_POINTER_PATH)
            .await
            .map_err(|e| RegistryIndexError::new(branch, e))?;

        let pointer: LatestPointer = serde_json::from_slice(&bytes)
            .map_err(|e| RegistryIndexError::new(branch, IndexErrorCause::Parse(e)))?;

        if let Err(e) = self.write_entry(LATEST_CACHE_KEY, branch, &pointer, LATEST_TTL) {
            warn!("Failed to save latest pointer to cache: {}", e);
        }

        Ok(pointer)
    }
}

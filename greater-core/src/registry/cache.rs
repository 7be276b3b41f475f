//! Registry index fetching with an on-disk TTL cache
//!
//! Each cached ref is stored as a pair of files:
//! `<cache dir>/<key>.json` (the validated index) and
//! `<cache dir>/<key>.meta.json` ([`CachedIndexMetadata`]).
//! Expiry is checked lazily on read; nothing is evicted in the background.
//! Cache I/O is best effort and never fails a fetch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{IndexErrorCause, RegistryIndex, RegistryIndexError, RemoteFetcher, MANIFEST_PATH};

/// Default index TTL (1 hour)
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(60 * 60);

/// Default branch carrying the latest-release pointer
pub const DEFAULT_BRANCH: &str = "main";

/// Cache file stem reserved for the latest-release pointer
pub(super) const LATEST_CACHE_KEY: &str = "latest";

/// Sidecar metadata for a cached entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedIndexMetadata {
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// When the entry was fetched (Unix epoch milliseconds)
    pub fetched_at: i64,

    pub ttl_ms: u64,
}

impl CachedIndexMetadata {
    /// Whether the entry may still be served at `now_ms`
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        let age = now_ms.saturating_sub(self.fetched_at);
        i128::from(age) < i128::from(self.ttl_ms)
    }
}

/// Per-call cache behaviour for [`RegistryIndexCache::fetch_registry_index`]
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Neither read nor write the cache
    pub skip_cache: bool,

    /// Ignore any cached entry but store the fresh one
    pub force_refresh: bool,

    /// TTL recorded with the fresh entry (defaults to the cache's TTL)
    pub ttl: Option<Duration>,
}

/// Derive the cache file stem for a ref.
///
/// Every character outside `[a-zA-Z0-9._-]` becomes `_`, so a ref can never
/// name a path outside the cache directory.
pub fn cache_key(git_ref: &str) -> String {
    if git_ref.is_empty() {
        return "_".to_string();
    }

    git_ref
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Index stems must not collide with the latest-pointer pair
fn index_key(git_ref: &str) -> String {
    let key = cache_key(git_ref);
    if key == LATEST_CACHE_KEY || key == "latest.meta" {
        format!("ref-{key}")
    } else {
        key
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Fetches registry indexes through a [`RemoteFetcher`] and caches them on disk
#[derive(Clone)]
pub struct RegistryIndexCache {
    pub(super) fetcher: Arc<dyn RemoteFetcher>,
    cache_dir: PathBuf,
    pub(super) default_branch: String,
    ttl: Duration,
    clock: Clock,
}

impl std::fmt::Debug for RegistryIndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryIndexCache")
            .field("cache_dir", &self.cache_dir)
            .field("default_branch", &self.default_branch)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RegistryIndexCache {
    /// Create a cache rooted at `cache_dir` (created lazily on first write)
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            cache_dir: cache_dir.into(),
            default_branch: DEFAULT_BRANCH.to_string(),
            ttl: DEFAULT_INDEX_TTL,
            clock: Arc::new(now_millis),
        }
    }

    /// Branch the latest-release pointer is read from
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// TTL applied to freshly cached indexes
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replace the wall clock (epoch milliseconds)
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub(super) fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Fetch the registry index for `git_ref`, serving a valid cached copy
    /// when allowed.
    ///
    /// Network, parse and schema failures are returned as
    /// [`RegistryIndexError`]; an expired or unreadable cache entry is never
    /// used as a fallback.
    pub async fn fetch_registry_index(
        &self,
        git_ref: &str,
        options: &FetchOptions,
    ) -> Result<RegistryIndex, RegistryIndexError> {
        if git_ref.trim().eq_ignore_ascii_case("latest") {
            return Err(RegistryIndexError::new(git_ref, IndexErrorCause::UnresolvedLatest));
        }

        let key = index_key(git_ref);

        if !options.skip_cache && !options.force_refresh {
            match self.read_entry::<RegistryIndex>(&key, git_ref) {
                Ok(Some(index)) => match index.validate() {
                    Ok(()) => {
                        debug!("Using cached registry index for {}", git_ref);
                        return Ok(index);
                    }
                    Err(e) => debug!("Ignoring invalid cached index for {}: {}", git_ref, e),
                },
                Ok(None) => debug!("No valid cached index for {}", git_ref),
                Err(e) => debug!("Failed to read cached index for {}: {}", git_ref, e),
            }
        }

        let bytes = self
            .fetcher
            .fetch_remote_file(git_ref, MANIFEST_PATH)
            .await
            .map_err(|e| RegistryIndexError::new(git_ref, e))?;

        let index =
            RegistryIndex::from_slice(&bytes).map_err(|cause| RegistryIndexError::new(git_ref, cause))?;

        debug!(
            "Fetched registry index for {}: {} components, {} faces, {} shared",
            git_ref,
            index.components.len(),
            index.faces.len(),
            index.shared.len()
        );

        if !options.skip_cache {
            let ttl = options.ttl.unwrap_or(self.ttl);
            if let Err(e) = self.write_entry(&key, git_ref, &index, ttl) {
                warn!("Failed to save registry index to cache: {}", e);
            }
        }

        Ok(index)
    }

    /// Read a cached entry if present, unexpired and written for `git_ref`.
    /// Distinct refs can share a sanitized key, so the sidecar ref decides.
    pub(super) fn read_entry<T: DeserializeOwned>(&self, key: &str, git_ref: &str) -> std::io::Result<Option<T>> {
        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);

        if !data_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let meta: CachedIndexMetadata = serde_json::from_slice(&std::fs::read(&meta_path)?)?;
        if meta.git_ref != git_ref {
            debug!("Cache entry {} belongs to {}, not {}", key, meta.git_ref, git_ref);
            return Ok(None);
        }

        let now = self.now();
        if !meta.is_valid_at(now) {
            debug!(
                "Cache expired for {} (age: {}ms, ttl: {}ms)",
                meta.git_ref,
                now.saturating_sub(meta.fetched_at),
                meta.ttl_ms
            );
            return Ok(None);
        }

        let value = serde_json::from_slice(&std::fs::read(&data_path)?)?;
        Ok(Some(value))
    }

    /// Persist an entry and its sidecar metadata
    pub(super) fn write_entry<T: Serialize>(
        &self,
        key: &str,
        git_ref: &str,
        value: &T,
        ttl: Duration,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let meta = CachedIndexMetadata {
            git_ref: git_ref.to_string(),
            fetched_at: self.now(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        };

        std::fs::write(self.data_path(key), serde_json::to_vec_pretty(value)?)?;
        std::fs::write(self.meta_path(key), serde_json::to_vec_pretty(&meta)?)?;

        debug!("Saved {} to cache: {}", git_ref, self.data_path(key).display());
        Ok(())
    }

    /// Remove every cached index and pointer. Returns the number of files removed.
    pub fn clear(&self) -> std::io::Result<usize> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }

        debug!("Cleared {} cache files from {}", removed, self.cache_dir.display());
        Ok(removed)
    }

    /// Remove the cached index for a single ref
    pub fn clear_ref(&self, git_ref: &str) -> std::io::Result<usize> {
        let key = index_key(git_ref);
        let mut removed = 0;

        for path in [self.data_path(&key), self.meta_path(&key)] {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(removed)
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.meta.json"))
    }
}

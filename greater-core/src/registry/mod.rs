//! Greater registry access
//!
//! The registry is a git repository. Every tag carries a manifest at
//! [`MANIFEST_PATH`] listing installable components, faces and shared
//! modules together with the checksum of each file.
//!
//! ```text
//! <repo>@<ref>
//!     ├── registry/index.json   ← RegistryIndex for that ref
//!     └── registry/latest.json  ← LatestPointer (read from the default branch)
//!            │
//!            ▼
//!     <cache dir>/<ref>.json + <ref>.meta.json
//! ```

mod cache;
mod error;
mod fetcher;
mod index;
mod resolve;

pub use cache::{cache_key, CachedIndexMetadata, FetchOptions, RegistryIndexCache, DEFAULT_INDEX_TTL};
pub use error::{FetchError, IndexErrorCause, RegistryIndexError};
#[cfg(feature = "remote")]
pub use fetcher::GitHubRawFetcher;
pub use fetcher::RemoteFetcher;
pub use index::{
    ComponentManifest, FaceManifest, FileChecksum, LatestPointer, PackageDependency,
    RegistryIndex, SharedManifest, LATEST_POINTER_PATH, MANIFEST_PATH,
};
pub use resolve::{RefSource, ResolvedRef, FALLBACK_REF, LATEST_TTL};

//! Registry error types

use thiserror::Error;

/// Failure to obtain a usable registry index for a ref.
///
/// Always propagated to the caller: a stale cache entry is never served in
/// place of a failed fetch.
#[derive(Error, Debug)]
#[error("Failed to load registry index for ref '{git_ref}'")]
pub struct RegistryIndexError {
    pub git_ref: String,
    #[source]
    pub cause: IndexErrorCause,
}

impl RegistryIndexError {
    pub fn new(git_ref: impl Into<String>, cause: impl Into<IndexErrorCause>) -> Self {
        Self {
            git_ref: git_ref.into(),
            cause: cause.into(),
        }
    }
}

/// Why a registry index could not be loaded
#[derive(Error, Debug)]
pub enum IndexErrorCause {
    #[error("network error")]
    Network(#[from] FetchError),

    #[error("registry index is not valid JSON")]
    Parse(#[from] serde_json::Error),

    #[error("registry index failed schema validation: {0}")]
    Schema(String),

    #[error("the 'latest' alias must be resolved to a concrete ref before fetching")]
    UnresolvedLatest,
}

/// Errors raised by a [`super::RemoteFetcher`]
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{path} not found at ref '{git_ref}'")]
    NotFound { git_ref: String, path: String },

    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("giving up on {url} after {attempts} attempts")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotFound { .. } | FetchError::Exhausted { .. } => false,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Transport { .. } => true,
        }
    }
}

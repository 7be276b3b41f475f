//! Remote content providers
//!
//! Retry and backoff live here, not in the index cache: the cache makes a
//! single call and surfaces whatever the provider finally returns.

use async_trait::async_trait;

use super::FetchError;

/// Reads a file from the registry repository at a given ref
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch the raw bytes of `path` at `git_ref`
    async fn fetch_remote_file(&self, git_ref: &str, path: &str) -> Result<Vec<u8>, FetchError>;
}

#[cfg(feature = "remote")]
pub use github::GitHubRawFetcher;

#[cfg(feature = "remote")]
mod github {
    use async_trait::async_trait;
    use std::time::Duration;

    use super::RemoteFetcher;
    use crate::config::RegistrySettings;
    use crate::integrity::warn_network_error;
    use crate::registry::FetchError;

    const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

    /// Fetches registry files from GitHub's raw content endpoint
    #[derive(Debug, Clone)]
    pub struct GitHubRawFetcher {
        client: reqwest::Client,
        base_url: String,
        owner: String,
        repo: String,
        max_attempts: u32,
        backoff: Duration,
    }

    impl GitHubRawFetcher {
        /// Build a fetcher for the registry described in the install config
        pub fn new(settings: &RegistrySettings) -> Result<Self, FetchError> {
            let client = reqwest::Client::builder()
                .user_agent(concat!("greater/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| FetchError::Transport {
                    url: settings.base_url().to_string(),
                    message: format!("failed to create HTTP client: {e}"),
                })?;

            Ok(Self {
                client,
                base_url: settings.base_url().trim_end_matches('/').to_string(),
                owner: settings.owner.clone(),
                repo: settings.repo.clone(),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                backoff: DEFAULT_BACKOFF,
            })
        }

        /// Override the retry policy. `backoff` doubles after every failure.
        pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
            self.max_attempts = max_attempts.max(1);
            self.backoff = backoff;
            self
        }

        /// URL of `path` at `git_ref`
        pub fn url_for(&self, git_ref: &str, path: &str) -> String {
            format!(
                "{}/{}/{}/{}/{}",
                self.base_url,
                self.owner,
                self.repo,
                git_ref,
                path.trim_start_matches('/')
            )
        }

        async fn fetch_once(&self, git_ref: &str, path: &str, url: &str) -> Result<Vec<u8>, FetchError> {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound {
                    git_ref: git_ref.to_string(),
                    path: path.to_string(),
                });
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: format!("failed to read response body: {e}"),
            })?;

            Ok(bytes.to_vec())
        }
    }

    #[async_trait]
    impl RemoteFetcher for GitHubRawFetcher {
        async fn fetch_remote_file(&self, git_ref: &str, path: &str) -> Result<Vec<u8>, FetchError> {
            let url = self.url_for(git_ref, path);
            let mut delay = self.backoff;
            let mut attempt = 1;

            loop {
                tracing::debug!("Fetching {} (attempt {}/{})", url, attempt, self.max_attempts);

                let err = match self.fetch_once(git_ref, path, &url).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) => e,
                };

                warn_network_error(&err.to_string(), attempt, self.max_attempts);

                if attempt >= self.max_attempts {
                    return Err(FetchError::Exhausted {
                        url,
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }

                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
        }
    }

}

//! Machine-wide directories for the registry cache and the audit log
//!
//! Resolution order for each path:
//! 1. Environment override (`GREATER_CACHE_DIR`, `GREATER_AUDIT_LOG`)
//! 2. Platform project directories
//! 3. Home directory fallback

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::trace;

pub const CACHE_DIR_ENV: &str = "GREATER_CACHE_DIR";
pub const AUDIT_LOG_ENV: &str = "GREATER_AUDIT_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreaterPaths {
    /// Directory holding cached registry indexes
    pub cache_dir: PathBuf,
    /// Live audit log file
    pub audit_log: PathBuf,
}

impl GreaterPaths {
    pub fn discover() -> Result<Self> {
        let cache_dir = match env_path(CACHE_DIR_ENV) {
            Some(path) => path,
            None => platform_cache_dir()?.join("registry"),
        };

        let audit_log = match env_path(AUDIT_LOG_ENV) {
            Some(path) => path,
            None => platform_config_dir()?.join("audit.log"),
        };

        trace!(
            "Resolved paths: cache={}, audit={}",
            cache_dir.display(),
            audit_log.display()
        );

        Ok(Self {
            cache_dir,
            audit_log,
        })
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    // Linux: ~/.cache/greater, ~/.config/greater
    // macOS: ~/Library/Caches/ai.equaltoai.greater, ~/Library/Application Support/ai.equaltoai.greater
    directories::ProjectDirs::from("ai", "equaltoai", "greater")
}

fn platform_cache_dir() -> Result<PathBuf> {
    if let Some(dirs) = project_dirs() {
        return Ok(dirs.cache_dir().to_path_buf());
    }

    dirs::home_dir()
        .map(|home| home.join(".cache").join("greater"))
        .ok_or_else(|| anyhow!("Could not determine platform cache directory"))
}

fn platform_config_dir() -> Result<PathBuf> {
    if let Some(dirs) = project_dirs() {
        return Ok(dirs.config_dir().to_path_buf());
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join("greater"))
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}

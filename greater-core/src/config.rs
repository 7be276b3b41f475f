//! Project install configuration (`components.json`)
//!
//! Absent file means defaults; a present but malformed file is an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::registry::DEFAULT_INDEX_TTL;

/// Config file name at the project root
pub const CONFIG_FILE: &str = "components.json";

/// Raw content host used when `registry.baseUrl` is unset
pub const DEFAULT_REGISTRY_BASE_URL: &str = "https://raw.githubusercontent.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config from {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config")]
    Serialize(#[source] serde_json::Error),

    #[error("Unknown install mode '{0}' (expected 'vendored' or 'hybrid')")]
    UnknownMode(String),

    #[error("Alias '{0}' escapes the project root")]
    UnsafeAlias(String),
}

/// How the consumer project consumes the component library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// All library source is copied into the project
    Vendored,

    /// Published packages stay as npm dependencies; only headless
    /// primitives and shared modules are copied in
    #[default]
    Hybrid,
}

impl std::str::FromStr for InstallMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vendored" => Ok(InstallMode::Vendored),
            "hybrid" => Ok(InstallMode::Hybrid),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for InstallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallMode::Vendored => f.write_str("vendored"),
            InstallMode::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Import aliases of the install destinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Aliases {
    pub greater: String,
    pub shared: String,
    pub headless: String,
    pub components: String,
}

impl Default for Aliases {
    fn default() -> Self {
        Self {
            greater: "$lib/greater".to_string(),
            shared: "$lib/greater/shared".to_string(),
            headless: "$lib/greater/headless".to_string(),
            components: "$lib/components/greater".to_string(),
        }
    }
}

/// Directory an import alias points at. `$lib` is SvelteKit's `src/lib`.
/// Aliases stay inside `project_root`; `..` segments are rejected.
pub fn alias_dir(project_root: &Path, alias: &str) -> Result<PathBuf, ConfigError> {
    let relative = match alias.strip_prefix("$lib") {
        Some(rest) => format!("src/lib{rest}"),
        None => alias.to_string(),
    };

    let mut dir = project_root.to_path_buf();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(ConfigError::UnsafeAlias(alias.to_string())),
            segment => dir.push(segment),
        }
    }
    Ok(dir)
}

/// Where the registry repository lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    pub owner: String,
    pub repo: String,
    pub default_branch: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_ms: Option<u64>,

    /// Local git checkout of the registry repository, used for tag
    /// signature checks. Relative paths start at the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout: Option<PathBuf>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            owner: "equaltoai".to_string(),
            repo: "greater-components".to_string(),
            default_branch: "main".to_string(),
            base_url: None,
            cache_ttl_ms: None,
            checkout: None,
        }
    }
}

impl RegistrySettings {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_REGISTRY_BASE_URL)
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INDEX_TTL)
    }

    /// `checkout` resolved against `project_root`
    pub fn checkout_dir(&self, project_root: &Path) -> Option<PathBuf> {
        self.checkout.as_ref().map(|dir| project_root.join(dir))
    }
}

/// Contents of `components.json`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallConfig {
    pub install_mode: InstallMode,

    /// Pinned registry ref; `latest` or absent defers to the latest pointer
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    pub aliases: Aliases,

    /// Extra `from -> to` import rewrites. A key ending in `/*` matches
    /// subpaths only.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub path_mappings: BTreeMap<String, String>,

    pub registry: RegistrySettings,

    pub verify_signatures: bool,
}

impl InstallConfig {
    /// Load `components.json` from a project root
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path(&project_root.join(CONFIG_FILE))
    }

    /// Load from an explicit file, falling back to defaults if it is missing
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: InstallConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            "Loaded config from {} (mode: {})",
            path.display(),
            config.install_mode
        );
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let mut json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        json.push('\n');

        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

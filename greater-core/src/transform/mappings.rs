//! Import path mappings for each install mode
//!
//! ```text
//! vendored: @equaltoai/greater-components/<sub>         → <aliases.greater>/<sub>
//! hybrid:   @equaltoai/greater-components/headless/<p>  → <aliases.headless>/<p>
//!           @equaltoai/greater-components-<sub>         → @equaltoai/greater-components/<sub>
//! both:     @equaltoai/greater-components/shared/<m>    → <aliases.shared>/<m>
//!           pathMappings from components.json
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{Aliases, InstallConfig, InstallMode};

/// Package every library import starts with
pub const CORE_PACKAGE: &str = "@equaltoai/greater-components";

/// Whether `specifier` names the core package, a subpath of it, or one of
/// its `-<sub>` sibling packages
pub fn is_library_specifier(specifier: &str) -> bool {
    specifier
        .strip_prefix(CORE_PACKAGE)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('-'))
}

/// Subpaths exported by the core package
pub const CORE_SUBPATHS: &[&str] = &[
    "primitives",
    "headless",
    "icons",
    "tokens",
    "utils",
    "adapters",
    "content",
];

/// Shared modules installed as source in every mode
pub const SHARED_MODULES: &[&str] = &[
    "admin",
    "auth",
    "chat",
    "compose",
    "messaging",
    "notifications",
    "search",
    "soul",
];

/// Headless primitives vendored in hybrid mode
pub const HEADLESS_PRIMITIVES: &[&str] = &[
    "button",
    "dropdown-menu",
    "menu",
    "modal",
    "popover",
    "select",
    "spinner",
    "tabs",
    "textfield",
    "toggle",
    "tooltip",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMapping {
    pub from: String,
    pub to: String,
    /// Matches only paths below `from`, never `from` itself
    pub is_glob: bool,
}

impl PathMapping {
    fn exact(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            is_glob: false,
        }
    }

    /// Rewrite `path` if this mapping applies
    fn apply(&self, path: &str) -> Option<String> {
        if !self.is_glob && path == self.from {
            return Some(self.to.clone());
        }

        let rest = path.strip_prefix(self.from.as_str())?.strip_prefix('/')?;
        if self.is_glob && rest.is_empty() {
            return None;
        }
        Some(format!("{}/{}", self.to, rest))
    }
}

fn join(alias: &str, segment: &str) -> String {
    format!("{}/{}", alias.trim_end_matches('/'), segment)
}

fn shared_mappings(aliases: &Aliases) -> Vec<PathMapping> {
    SHARED_MODULES
        .iter()
        .map(|m| PathMapping::exact(format!("{CORE_PACKAGE}/shared/{m}"), join(&aliases.shared, m)))
        .collect()
}

fn vendored_mappings(aliases: &Aliases) -> Vec<PathMapping> {
    CORE_SUBPATHS
        .iter()
        .map(|sub| PathMapping::exact(format!("{CORE_PACKAGE}/{sub}"), join(&aliases.greater, sub)))
        .collect()
}

fn hybrid_mappings(aliases: &Aliases) -> Vec<PathMapping> {
    let headless = HEADLESS_PRIMITIVES.iter().map(|p| {
        PathMapping::exact(format!("{CORE_PACKAGE}/headless/{p}"), join(&aliases.headless, p))
    });

    // Point legacy names at their final destination so rewrites never chain
    let legacy = CORE_SUBPATHS.iter().map(|sub| {
        let to = if *sub == "headless" {
            aliases.headless.trim_end_matches('/').to_string()
        } else {
            format!("{CORE_PACKAGE}/{sub}")
        };
        PathMapping::exact(format!("{CORE_PACKAGE}-{sub}"), to)
    });

    headless.chain(legacy).collect()
}

fn custom_mappings(path_mappings: &BTreeMap<String, String>) -> Vec<PathMapping> {
    path_mappings
        .iter()
        .map(|(from, to)| match from.strip_suffix("/*") {
            Some(base) => PathMapping {
                from: base.to_string(),
                to: to.trim_end_matches("/*").to_string(),
                is_glob: true,
            },
            None => PathMapping::exact(from.clone(), to.clone()),
        })
        .collect()
}

/// Every mapping that applies to a project, in no particular order
pub fn build_path_mappings(config: &InstallConfig) -> Vec<PathMapping> {
    let mut mappings = shared_mappings(&config.aliases);

    mappings.extend(match config.install_mode {
        InstallMode::Vendored => vendored_mappings(&config.aliases),
        InstallMode::Hybrid => hybrid_mappings(&config.aliases),
    });

    mappings.extend(custom_mappings(&config.path_mappings));
    mappings
}

/// Rewrite an import specifier with the longest matching mapping.
///
/// Returns `None` when nothing matches or the rewrite would not change it.
pub fn transform_path(path: &str, mappings: &[PathMapping]) -> Option<String> {
    let mut ordered: Vec<&PathMapping> = mappings.iter().collect();
    ordered.sort_by(|a, b| b.from.len().cmp(&a.from.len()));

    ordered
        .into_iter()
        .find_map(|m| m.apply(path))
        .filter(|rewritten| rewritten != path)
}

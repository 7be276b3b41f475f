//! Registry index parsing and lookups
//!
//! `registry/index.json` lists every component, face and shared module
//! available at a ref, with the files each one installs and their checksums.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

use super::IndexErrorCause;
use crate::integrity::is_valid_checksum_format;

/// Location of the manifest inside the registry repository
pub const MANIFEST_PATH: &str = "registry/index.json";

/// Location of the latest-release pointer on the default branch
pub const LATEST_POINTER_PATH: &str = "registry/latest.json";

/// The registry manifest for one ref
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryIndex {
    pub schema_version: String,

    /// Release version of the component library
    pub version: String,

    /// The git ref this index was generated from
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// ISO-8601 generation timestamp
    pub generated_at: String,

    /// Repository-wide `path -> checksum` map
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,

    pub components: BTreeMap<String, ComponentManifest>,

    #[serde(default)]
    pub faces: BTreeMap<String, FaceManifest>,

    #[serde(default)]
    pub shared: BTreeMap<String, SharedManifest>,
}

/// A single installable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentManifest {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Component category (e.g. `primitive`, `compound`, `pattern`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub files: Vec<FileChecksum>,

    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,

    #[serde(default)]
    pub peer_dependencies: Vec<PackageDependency>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// A face: an opinionated bundle of components and shared modules
/// (social, blog, admin, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceManifest {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub files: Vec<FileChecksum>,

    /// Components installed alongside the face
    #[serde(default)]
    pub components: Vec<String>,

    /// Shared modules installed alongside the face
    #[serde(default)]
    pub shared: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// A shared module (auth, compose, messaging, ...) used by several faces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedManifest {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub files: Vec<FileChecksum>,

    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// A file shipped by a registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChecksum {
    /// Repository-relative path
    pub path: String,

    /// `sha256-<base64>` digest of the file content
    pub checksum: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// An npm package the installed files import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub name: String,
    pub version: String,
}

/// Contents of `registry/latest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPointer {
    #[serde(rename = "ref")]
    pub git_ref: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl RegistryIndex {
    /// Parse and validate an index from raw manifest bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IndexErrorCause> {
        let index: RegistryIndex = serde_json::from_slice(bytes)?;
        index.validate()?;
        Ok(index)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<(), IndexErrorCause> {
        if self.schema_version.trim().is_empty() {
            return Err(IndexErrorCause::Schema("schemaVersion is empty".into()));
        }
        if self.git_ref.trim().is_empty() {
            return Err(IndexErrorCause::Schema("ref is empty".into()));
        }

        for (path, checksum) in &self.checksums {
            validate_file_entry("checksums", path, checksum)?;
        }

        for (name, component) in &self.components {
            let owner = format!("components.{name}");
            for file in &component.files {
                validate_file_entry(&owner, &file.path, &file.checksum)?;
            }
        }

        for (name, face) in &self.faces {
            let owner = format!("faces.{name}");
            for file in &face.files {
                validate_file_entry(&owner, &file.path, &file.checksum)?;
            }
        }

        for (name, shared) in &self.shared {
            let owner = format!("shared.{name}");
            for file in &shared.files {
                validate_file_entry(&owner, &file.path, &file.checksum)?;
            }
        }

        Ok(())
    }

    /// `path -> checksum` for a component's files, or `None` if the
    /// component is not in this index
    pub fn get_component_checksums(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.components
            .get(name)
            .map(|component| checksum_map(&component.files))
    }

    /// `path -> checksum` for a face's own files
    pub fn get_face_checksums(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.faces.get(name).map(|face| checksum_map(&face.files))
    }

    /// `path -> checksum` for a shared module's files
    pub fn get_shared_checksums(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.shared.get(name).map(|shared| checksum_map(&shared.files))
    }

    /// Search components by name, description and tags (case-insensitive)
    pub fn search(&self, query: &str) -> Vec<&ComponentManifest> {
        let query_lower = query.to_lowercase();

        self.components
            .values()
            .filter(|component| {
                let matches_name = component.name.to_lowercase().contains(&query_lower);
                let matches_desc = component
                    .description
                    .as_deref()
                    .map(|d| d.to_lowercase().contains(&query_lower))
                    .unwrap_or(false);
                let matches_tag = component
                    .tags
                    .iter()
                    .any(|t| t.to_lowercase().contains(&query_lower));

                matches_name || matches_desc || matches_tag
            })
            .collect()
    }

    /// Total number of installable entries
    pub fn entry_count(&self) -> usize {
        self.components.len() + self.faces.len() + self.shared.len()
    }
}

fn checksum_map(files: &[FileChecksum]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|f| (f.path.clone(), f.checksum.clone()))
        .collect()
}

fn validate_file_entry(owner: &str, path: &str, checksum: &str) -> Result<(), IndexErrorCause> {
    if path.is_empty() {
        return Err(IndexErrorCause::Schema(format!("{owner}: empty file path")));
    }

    // Paths end up joined onto the install directory
    let escapes = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(IndexErrorCause::Schema(format!(
            "{owner}: file path '{path}' must be relative and must not contain '..'"
        )));
    }

    if !is_valid_checksum_format(checksum) {
        return Err(IndexErrorCause::Schema(format!(
            "{owner}: invalid checksum for '{path}': expected sha256-<base64>, got '{checksum}'"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod index_tests {
    use super::*;

    fn sample_index_json() -> &'static str {
        r#"{
  "schemaVersion": "1.0.0",
  "version": "4.2.0",
  "ref": "greater-v4.2.0",
  "generatedAt": "2026-01-12T00:00:00Z",
  "checksums": {
    "packages/primitives/src/components/Button.svelte": "sha256-n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg="
  },
  "components": {
    "button": {
      "name": "button",
      "version": "4.2.0",
      "description": "Accessible button primitive",
      "type": "primitive",
      "files": [
        {
          "path": "packages/primitives/src/components/Button.svelte",
          "checksum": "sha256-n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg=",
          "size": 120
        }
      ],
      "dependencies": [{ "name": "@equaltoai/greater-components-headless", "version": "^4.2.0" }],
      "tags": ["form", "action"]
    },
    "timeline": {
      "name": "timeline",
      "version": "4.2.0",
      "description": "Virtualized status timeline",
      "files": [],
      "tags": ["social"]
    }
  }
}"#
    }

    #[test]
    fn test_parse_index_defaults_optional_maps() {
        let index = RegistryIndex::from_slice(sample_index_json().as_bytes()).unwrap();
        assert_eq!(index.git_ref, "greater-v4.2.0");
        assert_eq!(index.components.len(), 2);
        assert!(index.faces.is_empty());
        assert!(index.shared.is_empty());
        assert_eq!(index.components["button"].kind.as_deref(), Some("primitive"));
    }

    #[test]
    fn test_components_are_required() {
        let json = r#"{"schemaVersion":"1","version":"1","ref":"v1","generatedAt":"x"}"#;
        let err = RegistryIndex::from_slice(json.as_bytes()).unwrap_err();
        assert!(matches!(err, IndexErrorCause::Parse(_)));
    }

    #[test]
    fn test_bad_checksum_format_rejected() {
        let json = sample_index_json().replace(
            "sha256-n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg=\",\n          \"size\"",
            "md5-abc\",\n          \"size\"",
        );
        let err = RegistryIndex::from_slice(json.as_bytes()).unwrap_err();
        match err {
            IndexErrorCause::Schema(msg) => assert!(msg.contains("components.button")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_traversal_paths_rejected() {
        let json = sample_index_json().replace(
            "\"path\": \"packages/primitives/src/components/Button.svelte\"",
            "\"path\": \"../../.ssh/authorized_keys\"",
        );
        let err = RegistryIndex::from_slice(json.as_bytes()).unwrap_err();
        assert!(matches!(err, IndexErrorCause::Schema(_)));
    }

    #[test]
    fn test_checksum_lookups() {
        let index = RegistryIndex::from_slice(sample_index_json().as_bytes()).unwrap();

        let checksums = index.get_component_checksums("button").unwrap();
        assert_eq!(checksums.len(), 1);
        assert!(checksums.contains_key("packages/primitives/src/components/Button.svelte"));

        assert!(index.get_component_checksums("timeline").unwrap().is_empty());
        assert!(index.get_component_checksums("nonexistent").is_none());
        assert!(index.get_face_checksums("social").is_none());
        assert!(index.get_shared_checksums("auth").is_none());
    }

    #[test]
    fn test_search() {
        let index = RegistryIndex::from_slice(sample_index_json().as_bytes()).unwrap();

        let results = index.search("social");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "timeline");

        let results = index.search("BUTTON");
        assert_eq!(results.len(), 1);

        assert!(index.search("nonexistent").is_empty());
    }
}

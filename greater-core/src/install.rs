//! Installing registry entries into a project
//!
//! For every component, face or shared module:
//! signature check → fetch → checksum verification → import rewriting →
//! write → audit.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, InstallationRecord};
use crate::config::InstallConfig;
use crate::integrity::{
    verify_file_integrity, verify_git_tag, warn_force_overwrite, warn_skip_verification, warn_unsigned_tag,
    FileToVerify, GitTagProbe, GitTagVerificationResult, IntegrityReport, SecurityError, SecurityWarning,
    SignatureStatus, TagSignatureProbe, VerifyOptions,
};
use crate::registry::{FetchError, FileChecksum, RegistryIndex, RemoteFetcher};
use crate::transform::{build_path_mappings, transform_imports_with, FileKind, PathMapping};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Component '{name}' not found in registry ref '{git_ref}'")]
    UnknownComponent { name: String, git_ref: String },

    #[error("Face '{name}' not found in registry ref '{git_ref}'")]
    UnknownFace { name: String, git_ref: String },

    #[error("Shared module '{name}' not found in registry ref '{git_ref}'")]
    UnknownShared { name: String, git_ref: String },

    #[error("Failed to fetch {path}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("Refusing to overwrite existing file {}\n\nRe-run with --force to replace it.", .path.display())]
    FileExists { path: PathBuf },

    #[error("Registry path '{path}' cannot be installed: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Overwrite files that already exist
    pub force: bool,
    /// Install without checking file checksums
    pub skip_verification: bool,
    /// Require a valid signature on the registry tag
    pub verify_signature: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Component,
    Face,
    Shared,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Component => f.write_str("component"),
            EntryKind::Face => f.write_str("face"),
            EntryKind::Shared => f.write_str("shared"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstalledFile {
    /// Path inside the registry repository
    pub source: String,
    pub destination: PathBuf,
    pub rewrites: usize,
    pub replaced: bool,
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub kind: EntryKind,
    pub git_ref: String,
    pub files: Vec<InstalledFile>,
    /// `None` when verification was skipped
    pub report: Option<IntegrityReport>,
    pub signature: Option<GitTagVerificationResult>,
    pub warnings: Vec<SecurityWarning>,
}

impl InstallOutcome {
    pub fn replaced(&self) -> bool {
        self.files.iter().any(|f| f.replaced)
    }

    pub fn verified(&self) -> bool {
        self.report.as_ref().is_some_and(|r| r.all_verified)
    }
}

/// Installs entries of one registry index into a target directory
pub struct Installer {
    fetcher: Arc<dyn RemoteFetcher>,
    index: RegistryIndex,
    git_ref: String,
    mappings: Vec<PathMapping>,
    target_dir: PathBuf,
    audit: Option<AuditLog>,
    probe: Arc<dyn TagSignatureProbe>,
    signature: OnceCell<GitTagVerificationResult>,
}

impl Installer {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        index: RegistryIndex,
        git_ref: impl Into<String>,
        config: &InstallConfig,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            index,
            git_ref: git_ref.into(),
            mappings: build_path_mappings(config),
            target_dir: target_dir.into(),
            audit: None,
            probe: Arc::new(GitTagProbe::default()),
            signature: OnceCell::new(),
        }
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_signature_probe(mut self, probe: Arc<dyn TagSignatureProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub async fn install_component(&self, name: &str, options: InstallOptions) -> Result<InstallOutcome, InstallError> {
        let component = self.index.components.get(name).ok_or_else(|| InstallError::UnknownComponent {
            name: name.to_string(),
            git_ref: self.git_ref.clone(),
        })?;
        let checksums = self.index.get_component_checksums(name).unwrap_or_default();

        self.install_entry(EntryKind::Component, name, &component.files, checksums, options)
            .await
    }

    pub async fn install_shared(&self, name: &str, options: InstallOptions) -> Result<InstallOutcome, InstallError> {
        let shared = self.index.shared.get(name).ok_or_else(|| InstallError::UnknownShared {
            name: name.to_string(),
            git_ref: self.git_ref.clone(),
        })?;
        let checksums = self.index.get_shared_checksums(name).unwrap_or_default();

        self.install_entry(EntryKind::Shared, name, &shared.files, checksums, options)
            .await
    }

    /// Install a face's own files, then its components and shared modules
    pub async fn install_face(&self, name: &str, options: InstallOptions) -> Result<Vec<InstallOutcome>, InstallError> {
        let face = self.index.faces.get(name).ok_or_else(|| InstallError::UnknownFace {
            name: name.to_string(),
            git_ref: self.git_ref.clone(),
        })?;

        let mut outcomes = Vec::new();

        if !face.files.is_empty() {
            let checksums = self.index.get_face_checksums(name).unwrap_or_default();
            outcomes.push(
                self.install_entry(EntryKind::Face, name, &face.files, checksums, options)
                    .await?,
            );
        }

        for component in &face.components {
            outcomes.push(self.install_component(component, options).await?);
        }

        for shared in &face.shared {
            outcomes.push(self.install_shared(shared, options).await?);
        }

        info!(
            "Installed face {} ({} entries) from {}",
            name,
            outcomes.len(),
            self.git_ref
        );
        Ok(outcomes)
    }

    /// Install whatever `name` refers to: a component, else a face, else a
    /// shared module
    pub async fn install(&self, name: &str, options: InstallOptions) -> Result<Vec<InstallOutcome>, InstallError> {
        if self.index.components.contains_key(name) {
            Ok(vec![self.install_component(name, options).await?])
        } else if self.index.faces.contains_key(name) {
            self.install_face(name, options).await
        } else if self.index.shared.contains_key(name) {
            Ok(vec![self.install_shared(name, options).await?])
        } else {
            Err(InstallError::UnknownComponent {
                name: name.to_string(),
                git_ref: self.git_ref.clone(),
            })
        }
    }

    async fn install_entry(
        &self,
        kind: EntryKind,
        name: &str,
        files: &[FileChecksum],
        checksums: BTreeMap<String, String>,
        options: InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        // Entry checksums override the repository-wide map
        let mut expected = self.index.checksums.clone();
        expected.extend(checksums);

        let mut warnings = Vec::new();
        let result = self
            .install_files(kind, name, files, &expected, options, &mut warnings)
            .await;

        for warning in &warnings {
            self.audit_warning(warning).await;
        }

        let record = match &result {
            Ok(outcome) => InstallationRecord {
                component: name.to_string(),
                git_ref: self.git_ref.clone(),
                checksums: outcome
                    .report
                    .as_ref()
                    .map(IntegrityReport::verified_checksums)
                    .unwrap_or_default(),
                verified: outcome.verified(),
                signature_status: outcome.signature.as_ref().map(|s| s.signature_status),
                replaced: outcome.replaced(),
                files: outcome
                    .files
                    .iter()
                    .map(|f| f.destination.display().to_string())
                    .collect(),
                warnings: warnings.iter().map(|w| w.message.clone()).collect(),
                error_message: None,
            },
            Err(e) => InstallationRecord {
                component: name.to_string(),
                git_ref: self.git_ref.clone(),
                signature_status: self.signature.get().map(|s| s.signature_status),
                warnings: warnings.iter().map(|w| w.message.clone()).collect(),
                error_message: Some(e.to_string()),
                ..InstallationRecord::default()
            },
        };

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_installation(&record).await {
                warn!("Failed to write audit entry for {}: {}", name, e);
            }
        }

        result.map(|files| InstallOutcome { warnings, ..files })
    }

    async fn install_files(
        &self,
        kind: EntryKind,
        name: &str,
        files: &[FileChecksum],
        checksums: &BTreeMap<String, String>,
        options: InstallOptions,
        warnings: &mut Vec<SecurityWarning>,
    ) -> Result<InstallOutcome, InstallError> {
        let signature = if options.verify_signature {
            Some(self.check_signature(warnings).await?)
        } else {
            None
        };

        let mut fetched = Vec::with_capacity(files.len());
        for file in files {
            debug!("Fetching {} at {}", file.path, self.git_ref);
            let content = self
                .fetcher
                .fetch_remote_file(&self.git_ref, &file.path)
                .await
                .map_err(|source| InstallError::Fetch {
                    path: file.path.clone(),
                    source,
                })?;
            fetched.push(FileToVerify::new(file.path.clone(), content));
        }

        let report = if options.skip_verification {
            warnings.push(warn_skip_verification(&format!("--skip-verify used for {kind} '{name}'")));
            None
        } else {
            let fail_fast = VerifyOptions {
                fail_fast: true,
                skip_missing: false,
            };
            match verify_file_integrity(&fetched, checksums, fail_fast) {
                Ok(report) => Some(report),
                Err(e) => {
                    let err = SecurityError::from(e);
                    err.log_if_security_critical();
                    return Err(err.into());
                }
            }
        };

        let mut planned = Vec::with_capacity(fetched.len());
        for file in fetched {
            let destination = self.destination_for(&file.path)?;
            let replaced = tokio::fs::try_exists(&destination).await.unwrap_or(false);
            planned.push((file, destination, replaced));
        }

        let existing: Vec<&PathBuf> = planned
            .iter()
            .filter(|(_, _, replaced)| *replaced)
            .map(|(_, destination, _)| destination)
            .collect();
        if let Some(first) = existing.first() {
            if !options.force {
                return Err(InstallError::FileExists {
                    path: (*first).clone(),
                });
            }
            let paths: Vec<String> = existing.iter().map(|p| p.display().to_string()).collect();
            warnings.push(warn_force_overwrite(&paths));
        }

        let mut installed = Vec::with_capacity(planned.len());
        for (file, destination, replaced) in planned {
            let (bytes, rewrites) = self.rewrite(&file.path, file.content);

            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| InstallError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            tokio::fs::write(&destination, bytes)
                .await
                .map_err(|source| InstallError::Io {
                    path: destination.clone(),
                    source,
                })?;

            debug!("Wrote {} ({} import rewrites)", destination.display(), rewrites);
            installed.push(InstalledFile {
                source: file.path,
                destination,
                rewrites,
                replaced,
            });
        }

        info!("Installed {} {} ({} files) from {}", kind, name, installed.len(), self.git_ref);

        Ok(InstallOutcome {
            name: name.to_string(),
            kind,
            git_ref: self.git_ref.clone(),
            files: installed,
            report,
            signature,
            warnings: Vec::new(),
        })
    }

    /// Verify the tag once per installer; later calls reuse the result
    async fn check_signature(
        &self,
        warnings: &mut Vec<SecurityWarning>,
    ) -> Result<GitTagVerificationResult, SecurityError> {
        let first_check = !self.signature.initialized();
        let result = self
            .signature
            .get_or_init(|| verify_git_tag(self.probe.as_ref(), &self.git_ref))
            .await
            .clone();

        match result.signature_status {
            SignatureStatus::Valid => Ok(result),
            SignatureStatus::Unsigned => {
                if first_check {
                    warnings.push(warn_unsigned_tag(&self.git_ref));
                }
                Ok(result)
            }
            status => {
                let err = SecurityError::SignatureVerification {
                    git_ref: self.git_ref.clone(),
                    status,
                };
                err.log_if_security_critical();
                Err(err)
            }
        }
    }

    /// Rewrite imports in text sources; other files pass through untouched
    fn rewrite(&self, path: &str, content: Vec<u8>) -> (Vec<u8>, usize) {
        if FileKind::from_path(path).is_none() {
            return (content, 0);
        }

        match String::from_utf8(content) {
            Ok(text) => {
                let output = transform_imports_with(&text, &self.mappings, Some(path));
                let count = output.rewrites.len();
                (output.content.into_bytes(), count)
            }
            Err(e) => (e.into_bytes(), 0),
        }
    }

    /// Registry path → install path: everything up to and including the
    /// first `src` segment is dropped
    fn destination_for(&self, registry_path: &str) -> Result<PathBuf, InstallError> {
        let invalid = |reason: &str| InstallError::InvalidPath {
            path: registry_path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        for component in Path::new(registry_path).components() {
            match component {
                Component::Normal(segment) => segments.push(segment),
                Component::CurDir => {}
                _ => return Err(invalid("path must be relative and must not contain '..'")),
            }
        }

        let relative = match segments.iter().position(|s| *s == "src") {
            Some(i) => &segments[i + 1..],
            None => &segments[..],
        };
        if relative.is_empty() {
            return Err(invalid("path names no file"));
        }

        Ok(relative
            .iter()
            .fold(self.target_dir.clone(), |dest, segment| dest.join(segment)))
    }

    async fn audit_warning(&self, warning: &SecurityWarning) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_security_warning(warning).await {
                warn!("Failed to write security warning to audit log: {}", e);
            }
        }
    }
}

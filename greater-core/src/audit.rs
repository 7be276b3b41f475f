//! Append-only audit log of installs, verifications and security warnings
//!
//! One JSON object per line. Past `max_bytes` the live file is rotated
//! wholesale: `audit.log` → `audit.log.1` → ... → `audit.log.N`, the oldest
//! rotation being deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::integrity::{GitTagVerificationResult, IntegrityReport, SecurityWarning, SignatureStatus};

/// Rotate once the live log reaches this size (10 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Historical files kept beside the live log
pub const DEFAULT_MAX_ROTATIONS: u32 = 5;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit log I/O failed at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize audit entry")]
    Serialize(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AuditError + '_ {
    move |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Install,
    Update,
    Remove,
    Verify,
    Fetch,
    ConfigChange,
    SecurityWarning,
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.replace('-', "_")))
            .map_err(|_| format!("unknown audit action '{s}'"))
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::Install => "install",
            AuditAction::Update => "update",
            AuditAction::Remove => "remove",
            AuditAction::Verify => "verify",
            AuditAction::Fetch => "fetch",
            AuditAction::ConfigChange => "config_change",
            AuditAction::SecurityWarning => "security_warning",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_status: Option<SignatureStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditLogEntry {
    /// A successful entry stamped now, with every optional field empty
    pub fn new(action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            component: None,
            git_ref: None,
            checksums: None,
            verified: None,
            signature_status: None,
            warnings: None,
            details: None,
            success: true,
            error_message: None,
        }
    }
}

/// Filters for [`AuditLog::read`]
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub action: Option<AuditAction>,
    pub component: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.action.map_or(true, |a| entry.action == a)
            && self
                .component
                .as_deref()
                .map_or(true, |c| entry.component.as_deref() == Some(c))
            && self.since.map_or(true, |since| entry.timestamp >= since)
    }
}

/// Outcome of installing one registry entry
#[derive(Debug, Clone, Default)]
pub struct InstallationRecord {
    pub component: String,
    pub git_ref: String,
    pub checksums: BTreeMap<String, String>,
    pub verified: bool,
    pub signature_status: Option<SignatureStatus>,
    /// Existing files were overwritten (logged as an update)
    pub replaced: bool,
    pub files: Vec<String>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

/// A standalone verification run
#[derive(Debug, Clone, Default)]
pub struct VerificationRecord {
    pub component: Option<String>,
    pub git_ref: String,
    pub report: Option<IntegrityReport>,
    pub signature: Option<GitTagVerificationResult>,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    max_rotations: u32,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_rotations: DEFAULT_MAX_ROTATIONS,
        }
    }

    pub fn with_rotation(mut self, max_bytes: u64, max_rotations: u32) -> Self {
        self.max_bytes = max_bytes;
        self.max_rotations = max_rotations;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotation_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    /// Append one entry, rotating first if the live log is full
    pub async fn write(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        if let Ok(meta) = tokio::fs::metadata(&self.path).await {
            if meta.len() >= self.max_bytes {
                self.rotate().await?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err(&self.path))?;
        file.write_all(line.as_bytes()).await.map_err(io_err(&self.path))?;
        file.flush().await.map_err(io_err(&self.path))?;

        trace!("Audit: {} {:?}", entry.action, entry.component);
        Ok(())
    }

    async fn rotate(&self) -> Result<(), AuditError> {
        if self.max_rotations == 0 {
            debug!("Audit log full, discarding {}", self.path.display());
            return remove_if_exists(&self.path).await;
        }

        remove_if_exists(&self.rotation_path(self.max_rotations)).await?;

        for n in (1..self.max_rotations).rev() {
            let from = self.rotation_path(n);
            if tokio::fs::try_exists(&from).await.unwrap_or(false) {
                let to = self.rotation_path(n + 1);
                tokio::fs::rename(&from, &to).await.map_err(io_err(&from))?;
            }
        }

        let first = self.rotation_path(1);
        tokio::fs::rename(&self.path, &first)
            .await
            .map_err(io_err(&self.path))?;

        debug!("Rotated audit log to {}", first.display());
        Ok(())
    }

    /// Entries from the live log, newest first
    pub async fn read(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.path)(e)),
        };

        // Lines are parsed as bytes so one corrupt line cannot hide the rest
        let mut entries: Vec<AuditLogEntry> = content
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
            .filter_map(|line| match serde_json::from_slice::<AuditLogEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping malformed audit line: {}", e);
                    None
                }
            })
            .filter(|entry| query.matches(entry))
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }

        Ok(entries)
    }

    pub async fn log_installation(&self, record: &InstallationRecord) -> Result<(), AuditError> {
        let action = if record.replaced {
            AuditAction::Update
        } else {
            AuditAction::Install
        };

        let entry = AuditLogEntry {
            component: Some(record.component.clone()),
            git_ref: Some(record.git_ref.clone()),
            checksums: (!record.checksums.is_empty()).then(|| record.checksums.clone()),
            verified: Some(record.verified),
            signature_status: record.signature_status,
            warnings: (!record.warnings.is_empty()).then(|| record.warnings.clone()),
            details: (!record.files.is_empty()).then(|| json!({ "files": record.files })),
            success: record.error_message.is_none(),
            error_message: record.error_message.clone(),
            ..AuditLogEntry::new(action)
        };

        self.write(&entry).await
    }

    pub async fn log_security_warning(&self, warning: &SecurityWarning) -> Result<(), AuditError> {
        let entry = AuditLogEntry {
            timestamp: warning.timestamp,
            warnings: Some(vec![warning.message.clone()]),
            details: Some(serde_json::to_value(warning)?),
            ..AuditLogEntry::new(AuditAction::SecurityWarning)
        };

        self.write(&entry).await
    }

    pub async fn log_verification(&self, record: &VerificationRecord) -> Result<(), AuditError> {
        let checksums_ok = record.report.as_ref().map_or(true, |r| r.all_verified);
        let signature_ok = record.signature.as_ref().map_or(true, |s| s.verified);

        let mut details = serde_json::Map::new();
        if let Some(report) = &record.report {
            details.insert(
                "files".to_string(),
                json!({
                    "total": report.total_files,
                    "verified": report.verified_files,
                    "failed": report.failed_files,
                    "skipped": report.skipped_files,
                }),
            );
        }
        if let Some(signature) = &record.signature {
            details.insert("signature".to_string(), serde_json::to_value(signature)?);
        }

        let entry = AuditLogEntry {
            component: record.component.clone(),
            git_ref: Some(record.git_ref.clone()),
            checksums: record.report.as_ref().map(IntegrityReport::verified_checksums),
            verified: Some(checksums_ok && signature_ok),
            signature_status: record.signature.as_ref().map(|s| s.signature_status),
            details: (!details.is_empty()).then_some(Value::Object(details)),
            ..AuditLogEntry::new(AuditAction::Verify)
        };

        self.write(&entry).await
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), AuditError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn entry_at(action: AuditAction, component: &str, minutes_ago: i64) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            component: Some(component.to_string()),
            ..AuditLogEntry::new(action)
        }
    }

    #[tokio::test]
    async fn test_write_and_read_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::new(temp_dir.path().join("nested").join("audit.log"));

        log.write(&entry_at(AuditAction::Install, "button", 30)).await.unwrap();
        log.write(&entry_at(AuditAction::Install, "modal", 10)).await.unwrap();
        log.write(&entry_at(AuditAction::Verify, "button", 20)).await.unwrap();

        let entries = log.read(&AuditQuery::default()).await.unwrap();
        let components: Vec<_> = entries.iter().map(|e| e.component.as_deref().unwrap()).collect();
        assert_eq!(components, vec!["modal", "button", "button"]);
        assert_eq!(entries[1].action, AuditAction::Verify);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::new(temp_dir.path().join("audit.log"));

        log.write(&entry_at(AuditAction::Install, "button", 120)).await.unwrap();
        log.write(&entry_at(AuditAction::Install, "modal", 5)).await.unwrap();
        log.write(&entry_at(AuditAction::SecurityWarning, "modal", 4)).await.unwrap();

        let installs = log
            .read(&AuditQuery {
                action: Some(AuditAction::Install),
                ..AuditQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(installs.len(), 2);

        let recent_modal = log
            .read(&AuditQuery {
                component: Some("modal".to_string()),
                since: Some(Utc::now() - Duration::minutes(60)),
                limit: Some(1),
                ..AuditQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(recent_modal.len(), 1);
        assert_eq!(recent_modal[0].action, AuditAction::SecurityWarning);
    }

    #[tokio::test]
    async fn test_missing_log_and_malformed_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.log");
        let log = AuditLog::new(&path);

        assert!(log.read(&AuditQuery::default()).await.unwrap().is_empty());

        log.write(&AuditLogEntry::new(AuditAction::Fetch)).await.unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{ not json\n\n");
        std::fs::write(&path, content).unwrap();
        log.write(&AuditLogEntry::new(AuditAction::ConfigChange)).await.unwrap();

        assert_eq!(log.read(&AuditQuery::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.log");
        let log = AuditLog::new(&path);

        log.write(&entry_at(AuditAction::Install, "button", 5)).await.unwrap();
        let mut content = std::fs::read(&path).unwrap();
        content.extend_from_slice(b"\xff\xfe{\"action\":\"install\"}\r\n");
        std::fs::write(&path, content).unwrap();
        log.write(&entry_at(AuditAction::Verify, "modal", 1)).await.unwrap();

        let entries = log.read(&AuditQuery::default()).await.unwrap();
        let components: Vec<_> = entries.iter().filter_map(|e| e.component.as_deref()).collect();
        assert_eq!(components, vec!["modal", "button"]);
    }

    #[tokio::test]
    async fn test_rotation_shifts_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.log");
        let log = AuditLog::new(&path).with_rotation(1, 2);

        log.write(&entry_at(AuditAction::Install, "a", 3)).await.unwrap();
        log.write(&entry_at(AuditAction::Install, "b", 2)).await.unwrap();

        let rotated = |n: u32| temp_dir.path().join(format!("audit.log.{n}"));
        assert!(rotated(1).exists());
        assert!(!rotated(2).exists());
        assert!(std::fs::read_to_string(rotated(1)).unwrap().contains("\"component\":\"a\""));

        log.write(&entry_at(AuditAction::Install, "c", 1)).await.unwrap();
        log.write(&entry_at(AuditAction::Install, "d", 0)).await.unwrap();

        // Oldest rotation dropped, exactly one new .1 per rotation
        assert!(std::fs::read_to_string(rotated(1)).unwrap().contains("\"component\":\"c\""));
        assert!(std::fs::read_to_string(rotated(2)).unwrap().contains("\"component\":\"b\""));
        assert!(!rotated(3).exists());

        let live = log.read(&AuditQuery::default()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].component.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_zero_rotations_discards() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::new(temp_dir.path().join("audit.log")).with_rotation(1, 0);

        log.write(&AuditLogEntry::new(AuditAction::Fetch)).await.unwrap();
        log.write(&AuditLogEntry::new(AuditAction::Verify)).await.unwrap();

        assert!(!temp_dir.path().join("audit.log.1").exists());
        let entries = log.read(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Verify);
    }

    #[tokio::test]
    async fn test_log_installation_update_and_failure() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::new(temp_dir.path().join("audit.log"));

        let mut record = InstallationRecord {
            component: "button".to_string(),
            git_ref: "greater-v4.2.0".to_string(),
            verified: true,
            replaced: true,
            ..InstallationRecord::default()
        };
        log.log_installation(&record).await.unwrap();

        record.replaced = false;
        record.error_message = Some("checksum mismatch".to_string());
        log.log_installation(&record).await.unwrap();

        let entries = log.read(&AuditQuery::default()).await.unwrap();
        let update = entries.iter().find(|e| e.action == AuditAction::Update).unwrap();
        assert!(update.success);
        assert_eq!(update.git_ref.as_deref(), Some("greater-v4.2.0"));

        let failed = entries.iter().find(|e| e.action == AuditAction::Install).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error_message.as_deref(), Some("checksum mismatch"));
    }

    #[test]
    fn test_entry_wire_format() {
        let mut entry = AuditLogEntry::new(AuditAction::ConfigChange);
        entry.git_ref = Some("v1".to_string());
        entry.signature_status = Some(SignatureStatus::UnknownKey);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "config_change");
        assert_eq!(json["ref"], "v1");
        assert_eq!(json["signatureStatus"], "unknown_key");
        assert!(json.get("errorMessage").is_none());

        assert_eq!("security-warning".parse::<AuditAction>().unwrap(), AuditAction::SecurityWarning);
        assert!("explode".parse::<AuditAction>().is_err());
    }
}

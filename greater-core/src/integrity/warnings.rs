//! Security warnings
//!
//! Warnings are emitted the moment they are built: one coloured line on
//! stderr for the user and one `tracing` event under the `security` target.

use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ForceOverwrite,
    SkipVerification,
    UnsignedTag,
    NetworkError,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WarningKind::ForceOverwrite => "force_overwrite",
            WarningKind::SkipVerification => "skip_verification",
            WarningKind::UnsignedTag => "unsigned_tag",
            WarningKind::NetworkError => "network_error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityWarning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl SecurityWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>, context: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            context,
        }
    }

    /// Print to stderr and log under the `security` target
    pub fn emit(&self) {
        let label = format!("[{}]", self.severity.to_string().to_uppercase());
        let label = match self.severity {
            Severity::Low => label.dim(),
            Severity::Medium => label.yellow(),
            Severity::High => label.red(),
            Severity::Critical => label.red().bold(),
        };
        eprintln!("{} {} {}", "⚠".yellow(), label, self.message);

        match self.severity {
            Severity::Low | Severity::Medium => {
                tracing::warn!(target: "security", kind = %self.kind, severity = %self.severity, "{}", self.message);
            }
            Severity::High | Severity::Critical => {
                tracing::error!(target: "security", kind = %self.kind, severity = %self.severity, "{}", self.message);
            }
        }
    }
}

fn emitted(warning: SecurityWarning) -> SecurityWarning {
    warning.emit();
    warning
}

/// Existing files are about to be replaced
pub fn warn_force_overwrite(paths: &[String]) -> SecurityWarning {
    emitted(SecurityWarning::new(
        WarningKind::ForceOverwrite,
        Severity::Medium,
        format!("Overwriting {} existing file(s) with --force", paths.len()),
        json!({ "paths": paths }),
    ))
}

/// Checksum verification was turned off
pub fn warn_skip_verification(reason: &str) -> SecurityWarning {
    emitted(SecurityWarning::new(
        WarningKind::SkipVerification,
        Severity::High,
        format!("Skipping checksum verification: {reason}"),
        json!({ "reason": reason }),
    ))
}

/// The registry tag carries no signature
pub fn warn_unsigned_tag(git_ref: &str) -> SecurityWarning {
    emitted(SecurityWarning::new(
        WarningKind::UnsignedTag,
        Severity::Medium,
        format!("Registry ref '{git_ref}' is not signed; provenance cannot be verified"),
        json!({ "ref": git_ref }),
    ))
}

/// A registry request failed. High severity once retries are exhausted.
pub fn warn_network_error(error: &str, attempt: u32, max_attempts: u32) -> SecurityWarning {
    let exhausted = attempt >= max_attempts;
    let message = if exhausted {
        format!("Network error after {attempt}/{max_attempts} attempts, giving up: {error}")
    } else {
        format!("Network error (attempt {attempt}/{max_attempts}), retrying: {error}")
    };

    emitted(SecurityWarning::new(
        WarningKind::NetworkError,
        if exhausted { Severity::High } else { Severity::Medium },
        message,
        json!({ "error": error, "attempt": attempt, "maxAttempts": max_attempts }),
    ))
}

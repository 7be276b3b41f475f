//! Git tag signature verification
//!
//! `git verify-tag -v <ref>` is run through a [`CommandRunner`] and its
//! human-readable output is classified. GPG and SSH signing are both
//! recognised. Verification never fails outright: every outcome, including
//! a missing git binary, is encoded in [`GitTagVerificationResult`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default limit on a single git invocation
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(10);

static GPG_GOOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Good signature from "([^"]+)""#).expect("valid gpg signer regex"));

static GPG_KEY_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:using [A-Za-z0-9]+ key|key ID)\s+([0-9A-Fa-f]+)").expect("valid gpg key id regex")
});

static SSH_GOOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Good "git" signature for (\S+) with (\S+) key (\S+)"#).expect("valid ssh signer regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Valid,
    Invalid,
    Unsigned,
    UnknownKey,
    Expired,
    Error,
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignatureStatus::Valid => "valid",
            SignatureStatus::Invalid => "invalid",
            SignatureStatus::Unsigned => "unsigned",
            SignatureStatus::UnknownKey => "unknown_key",
            SignatureStatus::Expired => "expired",
            SignatureStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
    Gpg,
    Ssh,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitTagVerificationResult {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub verified: bool,
    pub signature_status: SignatureStatus,
    pub signature_type: SignatureType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl GitTagVerificationResult {
    fn new(git_ref: &str, status: SignatureStatus, signature_type: SignatureType) -> Self {
        Self {
            git_ref: git_ref.to_string(),
            verified: status == SignatureStatus::Valid,
            signature_status: status,
            signature_type,
            signer: None,
            key_id: None,
            error_message: None,
        }
    }

    fn error(git_ref: &str, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(git_ref, SignatureStatus::Error, SignatureType::Unknown)
        }
    }
}

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs the git binary. Tests substitute canned output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Runs `git` as a child process with a timeout
#[derive(Debug, Clone)]
pub struct GitCommandRunner {
    program: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for GitCommandRunner {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            working_dir: None,
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }
}

impl GitCommandRunner {
    /// Run inside a specific repository checkout
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for GitCommandRunner {
    async fn run(&self, args: &[&str]) -> io::Result<CommandOutput> {
        use tokio::process::Command;

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("git timed out after {}s", self.timeout.as_secs_f32()),
                )
            })??;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Reports the signature state of a ref
#[async_trait]
pub trait TagSignatureProbe: Send + Sync {
    async fn verify_tag(&self, git_ref: &str) -> GitTagVerificationResult;
}

/// [`TagSignatureProbe`] backed by `git verify-tag -v`
#[derive(Clone)]
pub struct GitTagProbe {
    runner: Arc<dyn CommandRunner>,
}

impl Default for GitTagProbe {
    fn default() -> Self {
        Self::new(Arc::new(GitCommandRunner::default()))
    }
}

impl GitTagProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TagSignatureProbe for GitTagProbe {
    async fn verify_tag(&self, git_ref: &str) -> GitTagVerificationResult {
        if git_ref.is_empty() || git_ref.starts_with('-') {
            return GitTagVerificationResult::error(git_ref, format!("refusing to verify invalid ref '{git_ref}'"));
        }

        match self.runner.run(&["verify-tag", "-v", git_ref]).await {
            Ok(output) => {
                debug!("git verify-tag exited with {:?}", output.status);
                // stdout carries the tag object; diagnostics go to stderr
                classify_verify_tag_output(git_ref, &output.stderr)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                GitTagVerificationResult::error(git_ref, "git is not installed or not on PATH")
            }
            Err(e) => GitTagVerificationResult::error(git_ref, format!("failed to run git verify-tag: {e}")),
        }
    }
}

/// Verify the signature on `git_ref` through `probe`
pub async fn verify_git_tag(probe: &dyn TagSignatureProbe, git_ref: &str) -> GitTagVerificationResult {
    let result = probe.verify_tag(git_ref).await;
    debug!(
        "Tag {} signature: {} ({:?})",
        git_ref, result.signature_status, result.signature_type
    );
    result
}

fn detect_signature_type(output: &str) -> SignatureType {
    const SSH_MARKERS: [&str; 6] = [
        "Good \"git\" signature",
        "ssh-keygen",
        "SSH",
        "ED25519 key",
        "principal",
        "allowedSignersFile",
    ];
    const GPG_MARKERS: [&str; 4] = ["gpg:", "GPG", "Good signature from", "BAD signature"];

    if SSH_MARKERS.iter().any(|m| output.contains(m)) {
        SignatureType::Ssh
    } else if GPG_MARKERS.iter().any(|m| output.contains(m)) {
        SignatureType::Gpg
    } else {
        SignatureType::Unknown
    }
}

/// Line prefixes gpg, ssh-keygen and git use for signature diagnostics
const DIAGNOSTIC_PREFIXES: [&str; 11] = [
    "gpg:",
    "error:",
    "fatal:",
    "warning:",
    "Good \"git\" signature",
    "Good signature from",
    "BAD signature",
    "Could not verify signature",
    "Signature verification failed",
    "No principal matched",
    "Can't check signature",
];

/// Signature diagnostics only. `-v` also prints the tag object, whose
/// free-text message must never influence the verdict.
fn diagnostic_lines(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|line| DIAGNOSTIC_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify the output of `git verify-tag -v`
pub fn classify_verify_tag_output(git_ref: &str, raw_output: &str) -> GitTagVerificationResult {
    let diagnostics = diagnostic_lines(raw_output);
    let output = diagnostics.as_str();
    let signature_type = detect_signature_type(output);
    let lower = output.to_lowercase();
    let with_status = |status| GitTagVerificationResult::new(git_ref, status, signature_type);

    if lower.contains("no signature found") || lower.contains("cannot verify a non-tag object") {
        return with_status(SignatureStatus::Unsigned);
    }

    if ["BAD signature", "Could not verify signature", "Signature verification failed"]
        .iter()
        .any(|m| output.contains(m))
    {
        return with_status(SignatureStatus::Invalid);
    }

    if lower.contains("expired") {
        return with_status(SignatureStatus::Expired);
    }

    if lower.contains("no public key")
        || ["Can't check signature", "No principal matched", "allowedSignersFile"]
            .iter()
            .any(|m| output.contains(m))
    {
        return with_status(SignatureStatus::UnknownKey);
    }

    if let Some(caps) = GPG_GOOD.captures(output) {
        let mut result = GitTagVerificationResult::new(git_ref, SignatureStatus::Valid, SignatureType::Gpg);
        result.signer = Some(caps[1].to_string());
        result.key_id = GPG_KEY_ID.captures(output).map(|k| k[1].to_string());
        return result;
    }

    if let Some(caps) = SSH_GOOD.captures(output) {
        let mut result = GitTagVerificationResult::new(git_ref, SignatureStatus::Valid, SignatureType::Ssh);
        result.signer = Some(caps[1].to_string());
        result.key_id = Some(caps[3].to_string());
        return result;
    }

    let message = if lower.contains("not found") {
        format!("tag '{git_ref}' not found")
    } else {
        let first_line = raw_output.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
        format!("unrecognised git verify-tag output: {first_line}")
    };

    GitTagVerificationResult {
        error_message: Some(message),
        ..with_status(SignatureStatus::Error)
    }
}

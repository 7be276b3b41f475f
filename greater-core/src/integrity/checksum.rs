//! Content checksums in the registry's `sha256-<base64>` format

use base64::prelude::{Engine as _, BASE64_STANDARD};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

use super::ChecksumVerificationError;

static CHECKSUM_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^sha256-[A-Za-z0-9+/]+=*$").expect("valid checksum regex")
});

/// Placeholder for the expected value when no checksum was published
const MISSING_CHECKSUM: &str = "<none>";

/// Checksum of raw content: `sha256-` + padded standard base64 of the digest
pub fn compute_checksum(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("sha256-{}", BASE64_STANDARD.encode(digest))
}

pub fn is_valid_checksum_format(checksum: &str) -> bool {
    CHECKSUM_FORMAT.is_match(checksum)
}

/// A fetched file awaiting verification
#[derive(Debug, Clone)]
pub struct FileToVerify {
    pub path: String,
    pub content: Vec<u8>,
    /// Overrides the manifest checksum for this path
    pub expected_checksum: Option<String>,
}

impl FileToVerify {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            expected_checksum: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Return an error on the first failure instead of reporting it
    pub fail_fast: bool,
    /// Files without a published checksum are skipped rather than failed
    pub skip_missing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Verified,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVerificationResult {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub actual: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub total_files: usize,
    pub verified_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub results: Vec<FileVerificationResult>,
    /// True only when nothing failed and nothing was skipped
    pub all_verified: bool,
}

impl IntegrityReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileVerificationResult> {
        self.results.iter().filter(|r| r.status == FileStatus::Failed)
    }

    /// `path -> actual checksum` for every verified file
    pub fn verified_checksums(&self) -> BTreeMap<String, String> {
        self.results
            .iter()
            .filter(|r| r.status == FileStatus::Verified)
            .map(|r| (r.path.clone(), r.actual.clone()))
            .collect()
    }
}

/// Verify fetched content against the registry checksums.
///
/// Only returns `Err` under `fail_fast`; otherwise every outcome is reported
/// in the [`IntegrityReport`].
pub fn verify_file_integrity(
    files: &[FileToVerify],
    checksums: &BTreeMap<String, String>,
    options: VerifyOptions,
) -> Result<IntegrityReport, ChecksumVerificationError> {
    let mut results = Vec::with_capacity(files.len());

    for file in files {
        let actual = compute_checksum(&file.content);
        let expected = file
            .expected_checksum
            .clone()
            .or_else(|| checksums.get(&file.path).cloned());

        let result = match expected {
            Some(expected) if expected == actual => FileVerificationResult {
                path: file.path.clone(),
                status: FileStatus::Verified,
                expected: Some(expected),
                actual,
                reason: None,
            },
            Some(expected) => {
                if options.fail_fast {
                    return Err(ChecksumVerificationError {
                        file_path: file.path.clone(),
                        expected,
                        actual,
                    });
                }
                FileVerificationResult {
                    path: file.path.clone(),
                    status: FileStatus::Failed,
                    expected: Some(expected),
                    actual,
                    reason: Some("checksum mismatch".to_string()),
                }
            }
            None if options.skip_missing => FileVerificationResult {
                path: file.path.clone(),
                status: FileStatus::Skipped,
                expected: None,
                actual,
                reason: Some("no checksum published".to_string()),
            },
            None => {
                if options.fail_fast {
                    return Err(ChecksumVerificationError {
                        file_path: file.path.clone(),
                        expected: MISSING_CHECKSUM.to_string(),
                        actual,
                    });
                }
                FileVerificationResult {
                    path: file.path.clone(),
                    status: FileStatus::Failed,
                    expected: None,
                    actual,
                    reason: Some("no checksum published".to_string()),
                }
            }
        };

        debug!("{}: {:?}", result.path, result.status);
        results.push(result);
    }

    let count = |status: FileStatus| results.iter().filter(|r| r.status == status).count();
    let verified_files = count(FileStatus::Verified);
    let failed_files = count(FileStatus::Failed);
    let skipped_files = count(FileStatus::Skipped);

    Ok(IntegrityReport {
        total_files: results.len(),
        verified_files,
        failed_files,
        skipped_files,
        all_verified: failed_files == 0 && skipped_files == 0,
        results,
    })
}

//! Security error types with actionable messages

use serde_json::{json, Value};
use thiserror::Error;

use super::SignatureStatus;

/// A file whose content does not hash to the checksum the registry published
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Checksum mismatch for {file_path}\n\nExpected: {expected}\nActual:   {actual}\n\nThe fetched file does not match the registry manifest. It may have been\ntampered with in transit, or the manifest may be out of date.\n\nTo refresh the manifest, re-run with:\n  greater add --refresh")]
pub struct ChecksumVerificationError {
    pub file_path: String,
    pub expected: String,
    pub actual: String,
}

/// Provenance and integrity failures that abort an install
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Signature verification failed for ref '{git_ref}': {status}\n\nThe registry tag is not signed by a trusted key.\n\nTo install anyway (not recommended), re-run without --verify-signature.")]
    SignatureVerification {
        git_ref: String,
        status: SignatureStatus,
    },

    #[error(transparent)]
    ChecksumVerification(#[from] ChecksumVerificationError),
}

impl SecurityError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::SignatureVerification { .. } => "SIGNATURE_VERIFICATION_FAILED",
            SecurityError::ChecksumVerification(_) => "CHECKSUM_VERIFICATION_FAILED",
        }
    }

    /// Structured details for audit records
    pub fn details(&self) -> Value {
        match self {
            SecurityError::SignatureVerification { git_ref, status } => json!({
                "ref": git_ref,
                "status": status,
            }),
            SecurityError::ChecksumVerification(e) => json!({
                "filePath": e.file_path,
                "expected": e.expected,
                "actual": e.actual,
            }),
        }
    }

    pub fn log_if_security_critical(&self) {
        match self {
            SecurityError::SignatureVerification { status, .. } if *status == SignatureStatus::Error => {
                tracing::warn!(target: "security", "[{}] {}", self.code(), self);
            }
            _ => {
                tracing::error!(target: "security", "INTEGRITY VIOLATION [{}]: {}", self.code(), self);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_error_converts() {
        let err: SecurityError = ChecksumVerificationError {
            file_path: "src/Button.svelte".to_string(),
            expected: "sha256-AAAA".to_string(),
            actual: "sha256-BBBB".to_string(),
        }
        .into();

        assert_eq!(err.code(), "CHECKSUM_VERIFICATION_FAILED");
        assert_eq!(err.details()["filePath"], "src/Button.svelte");
        assert!(err.to_string().contains("Expected: sha256-AAAA"));
    }

    #[test]
    fn test_signature_error_details() {
        let err = SecurityError::SignatureVerification {
            git_ref: "greater-v4.2.0".to_string(),
            status: SignatureStatus::Invalid,
        };

        assert_eq!(err.code(), "SIGNATURE_VERIFICATION_FAILED");
        assert_eq!(err.details()["status"], "invalid");
        assert!(err.to_string().contains("greater-v4.2.0"));
    }
}

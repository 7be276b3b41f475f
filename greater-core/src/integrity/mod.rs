//! Integrity and provenance checks for fetched registry content
//!
//! - Tag signatures: `git verify-tag -v` behind [`TagSignatureProbe`]
//! - File checksums: `sha256-<base64>` compared against the registry index
//! - Security warnings: emitted immediately to stderr and `tracing`

mod checksum;
mod error;
mod signature;
mod warnings;

pub use checksum::{
    compute_checksum, is_valid_checksum_format, verify_file_integrity, FileStatus, FileToVerify,
    FileVerificationResult, IntegrityReport, VerifyOptions,
};
pub use error::{ChecksumVerificationError, SecurityError};
pub use signature::{
    classify_verify_tag_output, verify_git_tag, CommandOutput, CommandRunner, GitCommandRunner,
    GitTagProbe, GitTagVerificationResult, SignatureStatus, SignatureType, TagSignatureProbe,
    DEFAULT_GIT_TIMEOUT,
};
pub use warnings::{
    warn_force_overwrite, warn_network_error, warn_skip_verification, warn_unsigned_tag,
    SecurityWarning, Severity, WarningKind,
};

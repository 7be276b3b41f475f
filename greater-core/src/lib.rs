//! Greater component installer core
//!
//! Install-time machinery for pulling Greater components out of the
//! versioned, git-hosted registry and into a consumer project:
//!
//! ```text
//! resolve ref ──► registry index (TTL cache) ──► fetch files
//!                                                   │
//!                    audit log ◄── write ◄── rewrite imports ◄── verify checksums
//! ```

pub mod audit;
pub mod config;
pub mod install;
pub mod integrity;
pub mod paths;
pub mod registry;
pub mod transform;

pub use audit::{AuditAction, AuditError, AuditLog, AuditLogEntry, AuditQuery};
pub use config::{ConfigError, InstallConfig, InstallMode};
pub use install::{InstallError, InstallOptions, InstallOutcome, Installer};
pub use integrity::{GitTagVerificationResult, IntegrityReport, SecurityError};
pub use registry::{RegistryIndex, RegistryIndexCache, RegistryIndexError};
pub use transform::{transform_imports, TransformOutput};

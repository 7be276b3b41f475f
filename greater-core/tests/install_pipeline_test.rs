//! End-to-end install pipeline: index cache → verify → rewrite → write → audit

mod common;

use async_trait::async_trait;
use common::*;
use greater_core::audit::{AuditAction, AuditLog, AuditQuery};
use greater_core::install::{EntryKind, InstallError, InstallOptions, Installer};
use greater_core::integrity::{
    GitTagVerificationResult, SecurityError, SignatureStatus, SignatureType, TagSignatureProbe,
};
use greater_core::registry::{FetchOptions, RegistryIndexCache};
use greater_core::InstallConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct FixedProbe {
    status: SignatureStatus,
    calls: AtomicUsize,
}

impl FixedProbe {
    fn new(status: SignatureStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TagSignatureProbe for FixedProbe {
    async fn verify_tag(&self, git_ref: &str) -> GitTagVerificationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GitTagVerificationResult {
            git_ref: git_ref.to_string(),
            verified: self.status == SignatureStatus::Valid,
            signature_status: self.status,
            signature_type: SignatureType::Gpg,
            signer: None,
            key_id: None,
            error_message: None,
        }
    }
}

async fn installer_for(fetcher: Arc<MemoryFetcher>, workspace: &TempDir) -> Installer {
    let cache = RegistryIndexCache::new(fetcher.clone(), workspace.path().join("cache"));
    let index = cache
        .fetch_registry_index(TEST_REF, &FetchOptions::default())
        .await
        .unwrap();

    Installer::new(
        fetcher,
        index,
        TEST_REF,
        &InstallConfig::default(),
        workspace.path().join("src/lib/greater"),
    )
    .with_audit_log(AuditLog::new(workspace.path().join("audit.log")))
}

#[tokio::test]
async fn test_component_install_end_to_end() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let installer = installer_for(Arc::new(sample_fetcher(TEST_REF)), &workspace).await;

    let outcomes = installer
        .install("button", InstallOptions::default())
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);

    let outcome = &outcomes[0];
    assert_eq!(outcome.kind, EntryKind::Component);
    assert!(outcome.verified());
    assert!(!outcome.replaced());
    assert!(outcome.warnings.is_empty());

    let report = outcome.report.as_ref().unwrap();
    assert_eq!(report.total_files, 1);
    assert_eq!(report.verified_files, 1);
    assert_eq!(report.failed_files, 0);

    let written = std::fs::read_to_string(
        workspace.path().join("src/lib/greater/components/Button.svelte"),
    )
    .unwrap();
    assert!(written.contains("from '$lib/greater/headless/button'"));
    // Commented-out imports are left alone
    assert!(written.contains("// import { legacy } from '@equaltoai/greater-components-primitives';"));

    let entries = AuditLog::new(workspace.path().join("audit.log"))
        .read(&AuditQuery::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Install);
    assert!(entries[0].success);
    assert_eq!(entries[0].component.as_deref(), Some("button"));
    assert_eq!(entries[0].verified, Some(true));
}

#[tokio::test]
async fn test_tampered_file_aborts_install() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let fetcher = Arc::new(sample_fetcher(TEST_REF));
    let installer = installer_for(fetcher.clone(), &workspace).await;

    let tampered = BUTTON_SOURCE.replace("Click", "Clack");
    fetcher.insert(TEST_REF, BUTTON_PATH, tampered);

    let err = installer
        .install_component("button", InstallOptions::default())
        .await
        .unwrap_err();
    match err {
        InstallError::Security(SecurityError::ChecksumVerification(e)) => {
            assert_eq!(e.file_path, BUTTON_PATH);
        }
        other => panic!("expected checksum error, got {other:?}"),
    }

    assert!(!workspace.path().join("src/lib/greater/components/Button.svelte").exists());

    let failures = AuditLog::new(workspace.path().join("audit.log"))
        .read(&AuditQuery::default())
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].success);
    assert!(failures[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Checksum mismatch"));
}

#[tokio::test]
async fn test_skip_verification_installs_tampered_file_with_warning() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let fetcher = Arc::new(sample_fetcher(TEST_REF));
    let installer = installer_for(fetcher.clone(), &workspace).await;
    fetcher.insert(TEST_REF, BUTTON_PATH, BUTTON_SOURCE.replace("Click", "Clack"));

    let outcome = installer
        .install_component(
            "button",
            InstallOptions {
                skip_verification: true,
                ..InstallOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.report.is_none());
    assert!(!outcome.verified());
    assert_eq!(outcome.warnings.len(), 1);

    let warnings = AuditLog::new(workspace.path().join("audit.log"))
        .read(&AuditQuery {
            action: Some(AuditAction::SecurityWarning),
            ..AuditQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn test_face_installs_its_components_and_shared_modules() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let installer = installer_for(Arc::new(sample_fetcher(TEST_REF)), &workspace).await;

    let outcomes = installer
        .install("social", InstallOptions::default())
        .await
        .unwrap();
    let kinds: Vec<EntryKind> = outcomes.iter().map(|o| o.kind).collect();
    assert_eq!(kinds, vec![EntryKind::Face, EntryKind::Component, EntryKind::Shared]);

    let target = workspace.path().join("src/lib/greater");
    let layout = std::fs::read_to_string(target.join("Layout.svelte")).unwrap();
    assert!(layout.contains("'$lib/greater/shared/auth'"));

    // Hybrid mode points legacy package names at the core package
    let auth = std::fs::read_to_string(target.join("index.ts")).unwrap();
    assert_eq!(auth, "export * from '@equaltoai/greater-components/utils';\n");
}

#[tokio::test]
async fn test_invalid_signature_blocks_every_install() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let probe = FixedProbe::new(SignatureStatus::Invalid);
    let installer = installer_for(Arc::new(sample_fetcher(TEST_REF)), &workspace)
        .await
        .with_signature_probe(probe.clone());

    let options = InstallOptions {
        verify_signature: true,
        ..InstallOptions::default()
    };

    for name in ["button", "auth"] {
        let err = installer.install(name, options).await.unwrap_err();
        assert!(matches!(
            err,
            InstallError::Security(SecurityError::SignatureVerification {
                status: SignatureStatus::Invalid,
                ..
            })
        ));
    }

    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    assert!(!workspace.path().join("src/lib/greater").exists());
}

#[tokio::test]
async fn test_unsigned_tag_warns_once_and_continues() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let probe = FixedProbe::new(SignatureStatus::Unsigned);
    let installer = installer_for(Arc::new(sample_fetcher(TEST_REF)), &workspace)
        .await
        .with_signature_probe(probe);

    let outcomes = installer
        .install(
            "social",
            InstallOptions {
                verify_signature: true,
                ..InstallOptions::default()
            },
        )
        .await
        .unwrap();

    let warning_count: usize = outcomes.iter().map(|o| o.warnings.len()).sum();
    assert_eq!(warning_count, 1);
    assert!(outcomes.iter().all(|o| o
        .signature
        .as_ref()
        .is_some_and(|s| s.signature_status == SignatureStatus::Unsigned)));
}

#[tokio::test]
async fn test_missing_registry_file_is_a_fetch_error() {
    init_test_logging();
    let workspace = TempDir::new().unwrap();
    let index_only = Arc::new(MemoryFetcher::default());
    index_only.insert(
        TEST_REF,
        greater_core::registry::MANIFEST_PATH,
        sample_index(TEST_REF).to_json().unwrap(),
    );

    let installer = installer_for(index_only, &workspace).await;
    let err = installer
        .install_component("button", InstallOptions::default())
        .await
        .unwrap_err();
    match err {
        InstallError::Fetch { path, .. } => assert_eq!(path, BUTTON_PATH),
        other => panic!("expected fetch error, got {other:?}"),
    }
}

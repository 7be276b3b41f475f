//! Shared fixtures for greater-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use greater_core::integrity::compute_checksum;
use greater_core::registry::{
    ComponentManifest, FaceManifest, FetchError, FileChecksum, RegistryIndex, RemoteFetcher,
    SharedManifest, MANIFEST_PATH,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

pub const TEST_REF: &str = "greater-v4.2.0";

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer().with_target(true))
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// In-memory registry repository: `(ref, path) -> bytes`
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    requests: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn insert(&self, git_ref: &str, path: &str, content: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert((git_ref.to_string(), path.to_string()), content.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for MemoryFetcher {
    async fn fetch_remote_file(&self, git_ref: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(format!("{git_ref}:{path}"));
        self.files
            .lock()
            .unwrap()
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                git_ref: git_ref.to_string(),
                path: path.to_string(),
            })
    }
}

pub const BUTTON_PATH: &str = "packages/primitives/src/components/Button.svelte";
pub const BUTTON_SOURCE: &str = r#"<script lang="ts">
  import { createButton } from '@equaltoai/greater-components/headless/button';
  // import { legacy } from '@equaltoai/greater-components-primitives';
  export let label = 'Click';
</script>

<button use:createButton>{label}</button>
"#;

pub const AUTH_PATH: &str = "packages/shared/auth/src/index.ts";
pub const AUTH_SOURCE: &str = "export * from '@equaltoai/greater-components-utils';\n";

pub const SOCIAL_LAYOUT_PATH: &str = "packages/faces/social/src/Layout.svelte";
pub const SOCIAL_LAYOUT_SOURCE: &str =
    "<script>\n  import Auth from '@equaltoai/greater-components/shared/auth';\n</script>\n<slot />\n";

fn file(path: &str, content: &str) -> FileChecksum {
    FileChecksum {
        path: path.to_string(),
        checksum: compute_checksum(content.as_bytes()),
        size: Some(content.len() as u64),
    }
}

/// Index with a `button` component, an `auth` shared module and a `social`
/// face bundling both
pub fn sample_index(git_ref: &str) -> RegistryIndex {
    let mut components = BTreeMap::new();
    components.insert(
        "button".to_string(),
        ComponentManifest {
            name: "button".to_string(),
            version: "4.2.0".to_string(),
            description: Some("Accessible button".to_string()),
            kind: Some("primitive".to_string()),
            files: vec![file(BUTTON_PATH, BUTTON_SOURCE)],
            dependencies: Vec::new(),
            peer_dependencies: Vec::new(),
            tags: vec!["form".to_string()],
        },
    );

    let mut shared = BTreeMap::new();
    shared.insert(
        "auth".to_string(),
        SharedManifest {
            name: "auth".to_string(),
            version: "4.2.0".to_string(),
            description: None,
            files: vec![file(AUTH_PATH, AUTH_SOURCE)],
            dependencies: Vec::new(),
        },
    );

    let mut faces = BTreeMap::new();
    faces.insert(
        "social".to_string(),
        FaceManifest {
            name: "social".to_string(),
            version: "4.2.0".to_string(),
            description: Some("Social timeline face".to_string()),
            files: vec![file(SOCIAL_LAYOUT_PATH, SOCIAL_LAYOUT_SOURCE)],
            components: vec!["button".to_string()],
            shared: vec!["auth".to_string()],
            dependencies: Vec::new(),
            tags: Vec::new(),
        },
    );

    RegistryIndex {
        schema_version: "1.0.0".to_string(),
        version: "4.2.0".to_string(),
        git_ref: git_ref.to_string(),
        generated_at: "2026-01-12T00:00:00Z".to_string(),
        checksums: BTreeMap::new(),
        components,
        faces,
        shared,
    }
}

/// A fetcher serving the sample index and all of its files at `git_ref`
pub fn sample_fetcher(git_ref: &str) -> MemoryFetcher {
    let fetcher = MemoryFetcher::default();
    let index = sample_index(git_ref);
    fetcher.insert(git_ref, MANIFEST_PATH, index.to_json().unwrap());
    fetcher.insert(git_ref, BUTTON_PATH, BUTTON_SOURCE);
    fetcher.insert(git_ref, AUTH_PATH, AUTH_SOURCE);
    fetcher.insert(git_ref, SOCIAL_LAYOUT_PATH, SOCIAL_LAYOUT_SOURCE);
    fetcher
}

//! Common test utilities for profile-sync integration tests
//!
//! Provides shared fixtures, seeded store layouts, and helper functions.

#![allow(dead_code)]

use profile_sync::{
    KeyValueStore, MemoryStore, ProfileId, ProfileManager, ProfileStream,
};
use serde_json::{json, Value};
use std::sync::Once;
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

/// Install env_logger once per test binary (`RUST_LOG=debug` to see output)
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

// =============================================================================
// Test Fixtures
// =============================================================================

/// Test fixture with an in-memory store and a manager over it
pub struct TestFixture {
    pub store: MemoryStore,
    pub manager: ProfileManager<MemoryStore>,
}

impl TestFixture {
    /// Create a fixture over an empty store
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Create a fixture over a pre-populated store
    pub fn with_store(store: MemoryStore) -> Self {
        init_logging();
        let manager = ProfileManager::builder(store.clone())
            .diagnostics(true)
            .build()
            .expect("Failed to create manager");

        Self { store, manager }
    }

    /// A second manager sharing the store, like another open window
    pub fn other_context(&self) -> ProfileManager<MemoryStore> {
        ProfileManager::builder(self.store.clone())
            .build()
            .expect("Failed to create manager")
    }

    /// Create a fixture whose store holds the current layout with `ids`, all
    /// with records, the first one active
    pub async fn with_profiles(ids: &[&str]) -> Self {
        let fixture = Self::new();
        let list: Vec<ProfileId> = ids
            .iter()
            .map(|id| ProfileId::new(*id, id.to_uppercase()))
            .collect();
        fixture
            .manager
            .update_profile_id_list(&list)
            .await
            .expect("Failed to write list");
        for id in ids {
            let profile = fixture.manager.defaults().get_default_profile(Some(id));
            fixture
                .manager
                .update_profile(&profile)
                .await
                .expect("Failed to write profile");
        }
        fixture
            .manager
            .update_active_profile_id(ids[0])
            .await
            .expect("Failed to write active id");
        fixture
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// A store holding only the legacy layout
pub fn legacy_store(ids: &[&str], active: &str, records: &[(&str, Value)]) -> MemoryStore {
    let mut items = vec![
        ("configProfileIDs".to_string(), json!(ids)),
        ("activeConfigID".to_string(), json!(active)),
    ];
    items.extend(
        records
            .iter()
            .map(|(id, record)| ((*id).to_string(), record.clone())),
    );
    MemoryStore::seeded(items)
}

/// Ids of the stored profile list, in order
pub async fn list_ids<S: KeyValueStore>(manager: &ProfileManager<S>) -> Vec<String> {
    manager
        .get_profile_id_list()
        .await
        .expect("Failed to read list")
        .into_iter()
        .map(|p| p.id)
        .collect()
}

/// Assert the three post-init invariants on a store
pub async fn assert_consistent<S: KeyValueStore>(manager: &ProfileManager<S>) {
    let ids = list_ids(manager).await;
    assert!(!ids.is_empty(), "profile list is empty");

    let active = manager.get_active_profile_id().await.unwrap();
    assert!(ids.contains(&active), "active id '{active}' is not listed");

    for id in &ids {
        assert!(
            manager.get_profile(id).await.unwrap().is_some(),
            "listed profile '{id}' has no record"
        );
    }
}

/// Next item of a stream, failing the test after one second
pub async fn next_item<T>(stream: &mut ProfileStream<T>) -> T {
    use futures::StreamExt;

    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream timed out")
        .expect("stream ended")
        .expect("stream yielded an error")
}

//! Profile Repository Integration Tests
//!
//! Tests for the repository and active profile operations including:
//! - Profile CRUD and list maintenance
//! - Active profile fallback behavior
//! - List/active consistency across operation sequences
//! - Quota and backend write failures propagating to the caller

mod common;

use common::{assert_consistent, list_ids, TestFixture};
use async_trait::async_trait;
use profile_sync::{
    Error, KeyValueStore, MemoryStore, ProfileId, ProfileManager, StorageChanges, StoreQuota,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::broadcast;

// =============================================================================
// Profile CRUD Operations
// =============================================================================

#[tokio::test]
async fn test_add_profile_appends_in_order() {
    let fixture = TestFixture::with_profiles(&["x"]).await;

    fixture.manager.add_profile(ProfileId::new("y", "Y")).await.unwrap();
    fixture.manager.add_profile(ProfileId::new("z", "Z")).await.unwrap();

    assert_eq!(list_ids(&fixture.manager).await, vec!["x", "y", "z"]);
    assert!(fixture.manager.get_profile("z").await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_profile_round_trips_options() {
    let fixture = TestFixture::with_profiles(&["x"]).await;

    let mut profile = fixture.manager.get_profile("x").await.unwrap().unwrap();
    profile.set("dicts.selected", json!(["google"])).unwrap();
    profile.set("custom.flag", json!(1)).unwrap();
    fixture.manager.update_profile(&profile).await.unwrap();

    let stored = fixture.manager.get_profile("x").await.unwrap().unwrap();
    assert_eq!(stored, profile);
}

#[tokio::test]
async fn test_removal_reassigns_active_profile() {
    let fixture = TestFixture::with_profiles(&["x", "y"]).await;

    fixture.manager.remove_profile("x").await.unwrap();

    assert_eq!(
        fixture.manager.get_profile_id_list().await.unwrap(),
        vec![ProfileId::new("y", "Y")]
    );
    assert_eq!(fixture.manager.get_active_profile_id().await.unwrap(), "y");
    assert_eq!(fixture.manager.get_profile("x").await.unwrap(), None);
}

#[tokio::test]
async fn test_remove_unlisted_profile_deletes_record_only() {
    let fixture = TestFixture::with_profiles(&["x", "y"]).await;
    fixture.store.set_one("stray", json!({"id": "stray"})).await.unwrap();

    fixture.manager.remove_profile("stray").await.unwrap();

    assert_eq!(list_ids(&fixture.manager).await, vec!["x", "y"]);
    assert!(fixture.store.get_one("stray").await.unwrap().is_none());
}

#[tokio::test]
async fn test_last_profile_cannot_be_removed() {
    let fixture = TestFixture::with_profiles(&["only"]).await;

    let err = fixture.manager.remove_profile("only").await.unwrap_err();

    assert!(matches!(err, Error::CannotRemoveLastProfile(ref id) if id == "only"));
    assert_consistent(&fixture.manager).await;
}

#[tokio::test]
async fn test_rename_and_duplicate() {
    let fixture = TestFixture::with_profiles(&["x"]).await;

    fixture.manager.rename_profile("x", "%%_sentence_%%").await.unwrap();
    let entry = &fixture.manager.get_profile_id_list().await.unwrap()[0];
    assert_eq!(entry.placeholder_key(), Some("sentence"));

    fixture
        .manager
        .set_profile_field("x", "mode.direct", json!(true))
        .await
        .unwrap();
    let copy = fixture
        .manager
        .duplicate_profile("x", ProfileId::new("x-copy", "Copy"))
        .await
        .unwrap();

    assert_eq!(copy.get("mode.direct"), Some(&json!(true)));
    assert_eq!(list_ids(&fixture.manager).await, vec!["x", "x-copy"]);
    assert!(
        fixture
            .manager
            .duplicate_profile("missing", ProfileId::new("m", "M"))
            .await
            .unwrap_err()
            .is_not_found()
    );
}

// =============================================================================
// Active Profile
// =============================================================================

#[tokio::test]
async fn test_active_profile_never_absent() {
    let fixture = TestFixture::new();

    // Nothing stored at all
    assert_eq!(fixture.manager.get_active_profile_id().await.unwrap(), "");
    let profile = fixture.manager.get_active_profile().await.unwrap();
    assert!(!profile.id.is_empty());

    // Id set, record missing
    fixture.manager.update_active_profile_id("ghost").await.unwrap();
    let profile = fixture.manager.get_active_profile().await.unwrap();
    assert_eq!(
        profile,
        fixture.manager.defaults().get_default_profile(Some("ghost"))
    );
}

#[tokio::test]
async fn test_stored_records_are_merged_with_defaults() {
    let fixture = TestFixture::with_profiles(&["x"]).await;
    fixture
        .store
        .set_one("x", json!({"id": "x", "waveform": false}))
        .await
        .unwrap();

    let profile = fixture.manager.get_active_profile().await.unwrap();

    assert_eq!(profile.get("waveform"), Some(&json!(false)));
    assert_eq!(profile.get("mode.holding.meta"), Some(&json!(false)));
}

#[tokio::test]
async fn test_list_and_active_stay_consistent() {
    let fixture = TestFixture::with_profiles(&["a", "b"]).await;
    let manager = &fixture.manager;

    manager.add_profile(ProfileId::new("c", "C")).await.unwrap();
    manager.update_active_profile_id("c").await.unwrap();
    manager.remove_profile("c").await.unwrap();
    assert_consistent(manager).await;

    manager.remove_profile("a").await.unwrap();
    manager.add_profile(ProfileId::new("d", "D")).await.unwrap();
    manager.update_active_profile_id("d").await.unwrap();
    manager.remove_profile("b").await.unwrap();
    assert_consistent(manager).await;

    assert_eq!(list_ids(manager).await, vec!["d"]);
    assert_eq!(manager.get_active_profile_id().await.unwrap(), "d");
}

#[tokio::test]
async fn test_other_context_sees_writes() {
    let fixture = TestFixture::with_profiles(&["a", "b"]).await;
    let other = fixture.other_context();

    other.update_active_profile_id("b").await.unwrap();

    assert_eq!(fixture.manager.get_active_profile().await.unwrap().id, "b");
}

// =============================================================================
// Store Failures
// =============================================================================

#[tokio::test]
async fn test_quota_failure_propagates() {
    let quota = StoreQuota {
        per_item_bytes: 1024,
        ..StoreQuota::default()
    };
    let manager = ProfileManager::builder(MemoryStore::with_quota(quota))
        .build()
        .unwrap();
    manager.init_profiles().await.unwrap();
    let active_id = manager.get_active_profile_id().await.unwrap();

    let err = manager
        .set_profile_field(&active_id, "notes", json!("x".repeat(2048)))
        .await
        .unwrap_err();

    assert!(err.is_quota_error());
    let stored = manager.get_profile(&active_id).await.unwrap().unwrap();
    assert_eq!(stored.get("notes"), None);
}

/// Backend that serves reads but rejects every write, like a synced area over
/// its write rate limit
struct ReadOnlyStore {
    inner: MemoryStore,
}

impl ReadOnlyStore {
    fn rejected(&self) -> Error {
        Error::StoreWrite {
            area: self.area_name().to_string(),
            reason: "write rate limit reached".into(),
        }
    }
}

#[async_trait]
impl KeyValueStore for ReadOnlyStore {
    fn area_name(&self) -> &str {
        "sync"
    }

    async fn get(&self, keys: &[&str]) -> profile_sync::Result<HashMap<String, Value>> {
        self.inner.get(keys).await
    }

    async fn get_all(&self) -> profile_sync::Result<HashMap<String, Value>> {
        self.inner.get_all().await
    }

    async fn set(&self, _items: HashMap<String, Value>) -> profile_sync::Result<()> {
        Err(self.rejected())
    }

    async fn remove(&self, _keys: &[&str]) -> profile_sync::Result<()> {
        Err(self.rejected())
    }

    async fn clear(&self) -> profile_sync::Result<()> {
        Err(self.rejected())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn test_backend_write_failure_propagates() {
    let inner = TestFixture::with_profiles(&["x"]).await.store;
    let manager = ProfileManager::builder(ReadOnlyStore { inner })
        .build()
        .unwrap();

    let err = manager
        .add_profile(ProfileId::new("y", "Y"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreWrite { ref area, .. } if area == "sync"));
    assert!(!err.is_quota_error());

    // Reads keep working and nothing was written
    assert_eq!(manager.get_active_profile_id().await.unwrap(), "x");
    assert_eq!(manager.get_profile_id_list().await.unwrap().len(), 1);
}

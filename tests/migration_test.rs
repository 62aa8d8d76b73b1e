//! Initialization and Migration Integration Tests
//!
//! Tests for `init_profiles` and `reset_all_profiles` including:
//! - Empty store bootstrap
//! - Legacy layout conversion
//! - Repair of partially written current layouts
//! - Idempotence and factory reset

mod common;

use common::{assert_consistent, legacy_store, list_ids, TestFixture};
use profile_sync::{KeyValueStore, MemoryStore, MigrationOutcome, ProfileId};
use serde_json::json;

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_empty_store_bootstrap() {
    let fixture = TestFixture::new();

    let (active, outcome) = fixture.manager.init_profiles_with_outcome().await.unwrap();

    assert_eq!(outcome, MigrationOutcome::Fresh);
    let list = fixture.manager.get_profile_id_list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, active.id);
    assert_eq!(list[0].placeholder_key(), Some("default"));
    assert_eq!(fixture.manager.get_active_profile_id().await.unwrap(), active.id);
    assert_eq!(
        fixture.manager.get_profile(&active.id).await.unwrap(),
        Some(fixture.manager.defaults().get_default_profile(Some(&active.id)))
    );
}

#[tokio::test]
async fn test_bootstrap_writes_each_record_separately() {
    let fixture = TestFixture::new();
    let mut changes = fixture.store.subscribe();

    let active = fixture.manager.init_profiles().await.unwrap();

    let first = changes.recv().await.unwrap();
    assert!(first.contains("profileIDList"));
    assert!(first.contains("activeProfileID"));
    assert!(!first.contains(&active.id));

    let second = changes.recv().await.unwrap();
    assert_eq!(second.keys().collect::<Vec<_>>(), vec![active.id.as_str()]);
}

// =============================================================================
// Legacy Migration
// =============================================================================

#[tokio::test]
async fn test_legacy_migration_preserves_order_and_names() {
    let store = legacy_store(
        &["a", "b"],
        "b",
        &[
            ("a", json!({"waveform": false})),
            ("b", json!({"name": "Custom", "dicts": {"selected": ["google"]}})),
        ],
    );
    let fixture = TestFixture::with_store(store);

    let (active, outcome) = fixture.manager.init_profiles_with_outcome().await.unwrap();

    assert_eq!(outcome, MigrationOutcome::Legacy { migrated: 2 });
    assert_eq!(active.id, "b");
    assert_eq!(active.get("dicts.selected"), Some(&json!(["google"])));

    let list = fixture.manager.get_profile_id_list().await.unwrap();
    assert_eq!(list[0].id, "a");
    assert_eq!(list[0].name, fixture.manager.defaults().get_default_profile_id(None).name);
    assert_eq!(list[1], ProfileId::new("b", "Custom"));
    assert_eq!(fixture.manager.get_active_profile_id().await.unwrap(), "b");

    let a = fixture.manager.get_profile("a").await.unwrap().unwrap();
    assert_eq!(a.get("waveform"), Some(&json!(false)));
    assert_eq!(a.get("stickyFold"), Some(&json!(false)));
    assert_consistent(&fixture.manager).await;
}

#[tokio::test]
async fn test_legacy_ids_without_records_get_defaults() {
    let fixture = TestFixture::with_store(legacy_store(&["a", "b"], "a", &[]));

    fixture.manager.init_profiles().await.unwrap();

    assert_eq!(list_ids(&fixture.manager).await, vec!["a", "b"]);
    assert_consistent(&fixture.manager).await;
}

#[tokio::test]
async fn test_current_layout_wins_over_legacy() {
    let mut items = vec![(
        "profileIDList".to_string(),
        json!([{"id": "now", "name": "Now"}]),
    )];
    items.push(("configProfileIDs".to_string(), json!(["old"])));
    items.push(("activeConfigID".to_string(), json!("old")));
    let fixture = TestFixture::with_store(MemoryStore::seeded(items));

    let (active, outcome) = fixture.manager.init_profiles_with_outcome().await.unwrap();

    assert_eq!(outcome, MigrationOutcome::Current);
    assert_eq!(active.id, "now");
    assert_eq!(list_ids(&fixture.manager).await, vec!["now"]);
    assert_eq!(fixture.manager.get_profile("old").await.unwrap(), None);
}

// =============================================================================
// Idempotence and Reset
// =============================================================================

#[tokio::test]
async fn test_init_twice_is_stable() {
    let fixture = TestFixture::with_store(legacy_store(&["a", "b"], "b", &[]));

    let first = fixture.manager.init_profiles().await.unwrap();
    let list = fixture.manager.get_profile_id_list().await.unwrap();

    let (second, outcome) = fixture.manager.init_profiles_with_outcome().await.unwrap();

    assert_eq!(outcome, MigrationOutcome::Current);
    assert_eq!(first, second);
    assert_eq!(fixture.manager.get_profile_id_list().await.unwrap(), list);
    assert_eq!(fixture.manager.get_active_profile_id().await.unwrap(), "b");
}

#[tokio::test]
async fn test_reset_leaves_fresh_bootstrap_shape() {
    let fixture = TestFixture::with_profiles(&["a", "b", "c"]).await;
    fixture
        .manager
        .set_profile_field("b", "waveform", json!(false))
        .await
        .unwrap();

    let active = fixture.manager.reset_all_profiles().await.unwrap();

    let all = fixture.store.get_all().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(
        all.get(&active.id),
        Some(&fixture.manager.defaults().get_default_profile(Some(&active.id)).to_value().unwrap())
    );
    assert_eq!(all.get("activeProfileID"), Some(&json!(active.id)));
    assert_consistent(&fixture.manager).await;
}

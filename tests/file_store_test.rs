//! File Store Integration Tests
//!
//! Tests for running the profile manager on the JSON file store including:
//! - Persistence across reopen
//! - Legacy migration from an existing file
//! - Change streams on the file store

mod common;

use common::{assert_consistent, init_logging, list_ids, next_item};
use profile_sync::{
    FileProfileManager, FileStoreConfig, JsonFileStore, MigrationOutcome, ProfileId,
    ProfileManager,
};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

fn open_manager(dir: &Path) -> FileProfileManager {
    init_logging();
    let config = FileStoreConfig::builder("test-app").config_dir(dir).build();
    let store = JsonFileStore::open(&config).expect("Failed to open store");
    ProfileManager::builder(store)
        .build()
        .expect("Failed to create manager")
}

fn read_store_file(dir: &Path) -> Value {
    let content = std::fs::read_to_string(dir.join("storage.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_profiles_persist_across_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let active_id = {
        let manager = open_manager(temp_dir.path());
        manager.init_profiles().await.unwrap();
        manager.add_profile(ProfileId::new("work", "Work")).await.unwrap();
        manager.update_active_profile_id("work").await.unwrap();
        manager
            .set_profile_field("work", "waveform", json!(false))
            .await
            .unwrap();
        manager.get_active_profile_id().await.unwrap()
    };

    let manager = open_manager(temp_dir.path());
    let (active, outcome) = manager.init_profiles_with_outcome().await.unwrap();

    assert_eq!(outcome, MigrationOutcome::Current);
    assert_eq!(active.id, active_id);
    assert_eq!(active.get("waveform"), Some(&json!(false)));
    assert_eq!(list_ids(&manager).await.len(), 2);
}

#[tokio::test]
async fn test_records_are_sharded_in_file() {
    let temp_dir = TempDir::new().unwrap();
    let manager = open_manager(temp_dir.path());

    let active = manager.init_profiles().await.unwrap();

    let file = read_store_file(temp_dir.path());
    assert_eq!(file["activeProfileID"], json!(active.id));
    assert_eq!(file["profileIDList"][0]["id"], json!(active.id));
    assert_eq!(file[active.id.as_str()]["waveform"], json!(true));
}

#[tokio::test]
async fn test_migrates_legacy_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("storage.json"),
        json!({
            "configProfileIDs": ["old"],
            "activeConfigID": "old",
            "old": {"name": "Old Config", "stickyFold": true}
        })
        .to_string(),
    )
    .unwrap();

    let manager = open_manager(temp_dir.path());
    let (active, outcome) = manager.init_profiles_with_outcome().await.unwrap();

    assert_eq!(outcome, MigrationOutcome::Legacy { migrated: 1 });
    assert_eq!(active.get("stickyFold"), Some(&json!(true)));
    assert_eq!(
        manager.get_profile_id_list().await.unwrap(),
        vec![ProfileId::new("old", "Old Config")]
    );
    assert_consistent(&manager).await;
}

#[tokio::test]
async fn test_active_stream_on_file_store() {
    let temp_dir = TempDir::new().unwrap();
    let manager = open_manager(temp_dir.path());
    manager.init_profiles().await.unwrap();
    manager.add_profile(ProfileId::new("b", "B")).await.unwrap();

    let mut stream = manager.active_profile_stream();
    next_item(&mut stream).await;

    manager.update_active_profile_id("b").await.unwrap();
    assert_eq!(next_item(&mut stream).await.id, "b");
}

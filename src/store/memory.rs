//! In-memory key-value store
//!
//! Clones share the same state and change channel, so two clones behave like
//! two execution contexts attached to one synced area.

use super::{apply_remove, apply_set, KeyValueStore, StorageChanges, StoreQuota, DEFAULT_CHANNEL_CAPACITY};
use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

struct Shared {
    data: RwLock<HashMap<String, Value>>,
    sender: broadcast::Sender<StorageChanges>,
    quota: StoreQuota,
}

/// In-memory store with quota enforcement (not persisted)
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create a new memory store with the default synced-area quota
    #[must_use]
    pub fn new() -> Self {
        Self::with_quota(StoreQuota::default())
    }

    /// Create a memory store with a custom quota
    #[must_use]
    pub fn with_quota(quota: StoreQuota) -> Self {
        Self::with_options(quota, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a memory store with a custom quota and change channel capacity
    #[must_use]
    pub fn with_options(quota: StoreQuota, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(HashMap::new()),
                sender,
                quota,
            }),
        }
    }

    /// Seed the store without publishing changes
    ///
    /// Useful for setting up legacy layouts in tests.
    #[must_use]
    pub fn seeded(items: impl IntoIterator<Item = (String, Value)>) -> Self {
        let store = Self::new();
        store.shared.data.write().extend(items);
        store
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.data.read().is_empty()
    }

    fn publish(&self, changes: StorageChanges) {
        if changes.is_empty() {
            return;
        }
        // No receivers is fine; nobody is listening yet.
        if self.shared.sender.send(changes).is_err() {
            debug!("No subscribers for memory store changes");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn area_name(&self) -> &str {
        "memory"
    }

    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let data = self.shared.data.read();
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.shared.data.read().clone())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        let mut data = self.shared.data.write();
        self.shared.quota.check(&data, &items)?;
        let changes = apply_set(&mut data, items);
        // Publish under the guard so batches arrive in commit order
        self.publish(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut data = self.shared.data.write();
        let changes = apply_remove(&mut data, keys);
        self.publish(changes);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut data = self.shared.data.write();
        let mut changes = StorageChanges::new();
        for (key, old) in data.drain() {
            changes.record(key, Some(old), None);
        }
        self.publish(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.shared.sender.subscribe()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Key-value store trait and implementations
//!
//! Profiles live in a synced key-value area: async get/set/remove plus a change
//! subscription. The [`KeyValueStore`] trait is the seam, so the manager can run
//! against [`MemoryStore`] in tests, [`JsonFileStore`] on disk, or a host
//! binding to a real synced area.
//!
//! # Change batches
//!
//! Every mutating call publishes at most one [`StorageChanges`] batch, holding
//! only the keys whose value actually changed. A single-key write is a one-entry
//! batch; there is no separate single-event shape.

mod memory;

#[cfg(feature = "file-store")]
mod file;

pub use memory::MemoryStore;

#[cfg(feature = "file-store")]
pub use file::JsonFileStore;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Default change channel capacity for store backends
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Change Events
// =============================================================================

/// Old and new value of a single key
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageChange {
    /// Value after the change (`None` when the key was removed)
    #[serde(rename = "newValue", skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,

    /// Value before the change (`None` when the key was created)
    #[serde(rename = "oldValue", skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
}

/// A batch of key changes published by one store operation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StorageChanges {
    changes: HashMap<String, StorageChange>,
}

impl StorageChanges {
    /// Create an empty batch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change, dropping it if old and new values are equal
    pub fn record(&mut self, key: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) {
        if old_value != new_value {
            self.changes.insert(
                key.into(),
                StorageChange {
                    new_value,
                    old_value,
                },
            );
        }
    }

    /// Get the change for a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StorageChange> {
        self.changes.get(key)
    }

    /// Check if the batch touches a key
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    /// Keys touched by this batch
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<(String, StorageChange)> for StorageChanges {
    fn from_iter<I: IntoIterator<Item = (String, StorageChange)>>(iter: I) -> Self {
        Self {
            changes: iter
                .into_iter()
                .filter(|(_, c)| c.new_value != c.old_value)
                .collect(),
        }
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Trait for synced key-value store implementations
///
/// The store is shared with other execution contexts and may change under us at
/// any time; callers learn about those changes through [`subscribe`](Self::subscribe).
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Name of this store area, used in logs and errors (e.g., "sync", "memory")
    fn area_name(&self) -> &str;

    /// Read the given keys. Absent keys are omitted from the result.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Read every key in the store
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Write all items, publishing one change batch
    async fn set(&self, items: HashMap<String, Value>) -> Result<()>;

    /// Remove the given keys, publishing one change batch
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Remove every key
    async fn clear(&self) -> Result<()>;

    /// Subscribe to change batches
    fn subscribe(&self) -> broadcast::Receiver<StorageChanges>;

    /// Read a single key
    async fn get_one(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(&[key]).await?.remove(key))
    }

    /// Write a single key
    async fn set_one(&self, key: &str, value: Value) -> Result<()> {
        self.set(HashMap::from([(key.to_string(), value)])).await
    }
}

// =============================================================================
// Quota
// =============================================================================

/// Size limits enforced by a store backend
///
/// Defaults match a browser synced storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreQuota {
    /// Maximum size of one item (key length + JSON length of the value)
    pub per_item_bytes: usize,
    /// Maximum size of the whole store
    pub total_bytes: usize,
    /// Maximum number of items
    pub max_items: usize,
}

impl Default for StoreQuota {
    fn default() -> Self {
        Self {
            per_item_bytes: 8192,
            total_bytes: 102_400,
            max_items: 512,
        }
    }
}

impl StoreQuota {
    /// No limits at all
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            per_item_bytes: usize::MAX,
            total_bytes: usize::MAX,
            max_items: usize::MAX,
        }
    }

    /// Size of an item as counted against the quota
    #[must_use]
    pub fn item_size(key: &str, value: &Value) -> usize {
        key.len() + value.to_string().len()
    }

    /// Check that `data` with `items` applied stays within limits
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuotaExceeded`] or [`Error::TooManyItems`] on violation.
    pub fn check(&self, data: &HashMap<String, Value>, items: &HashMap<String, Value>) -> Result<()> {
        for (key, value) in items {
            let size = Self::item_size(key, value);
            if size > self.per_item_bytes {
                return Err(Error::QuotaExceeded {
                    key: key.clone(),
                    size,
                    limit: self.per_item_bytes,
                });
            }
        }

        let count = data.len() + items.keys().filter(|k| !data.contains_key(*k)).count();
        if count > self.max_items {
            return Err(Error::TooManyItems {
                count,
                limit: self.max_items,
            });
        }

        let total: usize = data
            .iter()
            .filter(|(k, _)| !items.contains_key(*k))
            .chain(items.iter())
            .map(|(k, v)| Self::item_size(k, v))
            .fold(0usize, usize::saturating_add);
        if total > self.total_bytes {
            return Err(Error::QuotaExceeded {
                key: "<total>".to_string(),
                size: total,
                limit: self.total_bytes,
            });
        }

        Ok(())
    }
}

/// Apply `items` to `data` and collect the resulting change batch
pub(crate) fn apply_set(data: &mut HashMap<String, Value>, items: HashMap<String, Value>) -> StorageChanges {
    let mut changes = StorageChanges::new();
    for (key, value) in items {
        let old = data.insert(key.clone(), value.clone());
        changes.record(key, old, Some(value));
    }
    changes
}

/// Remove `keys` from `data` and collect the resulting change batch
pub(crate) fn apply_remove(data: &mut HashMap<String, Value>, keys: &[&str]) -> StorageChanges {
    let mut changes = StorageChanges::new();
    for key in keys {
        if let Some(old) = data.remove(*key) {
            changes.record(*key, Some(old), None);
        }
    }
    changes
}

// =============================================================================
// Tests
// =============================================================================

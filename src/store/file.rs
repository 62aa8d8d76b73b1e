//! JSON file-backed key-value store
//!
//! The whole area is kept in memory and flushed to one JSON file on every
//! mutation. Writes are atomic: the content goes to a temp file which is then
//! renamed over the target.

use super::{apply_remove, apply_set, KeyValueStore, StorageChanges, StoreQuota};
use crate::config::FileStoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

struct Shared {
    path: PathBuf,
    pretty: bool,
    quota: StoreQuota,
    data: Mutex<HashMap<String, Value>>,
    sender: broadcast::Sender<StorageChanges>,
}

/// Key-value store persisted to a single JSON file
#[derive(Clone)]
pub struct JsonFileStore {
    shared: Arc<Shared>,
}

impl JsonFileStore {
    /// Open (or create) the store described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing file
    /// cannot be read or parsed.
    pub fn open(config: &FileStoreConfig) -> Result<Self> {
        let path = config.store_path();

        if !config.config_dir.exists() {
            std::fs::create_dir_all(&config.config_dir).map_err(|e| Error::DirectoryCreate {
                path: config.config_dir.clone(),
                source: e,
            })?;
        }

        let data = if path.exists() {
            read_store_file(&path)?
        } else {
            HashMap::new()
        };

        info!(
            "Opened file store at {:?} ({} keys)",
            path.display(),
            data.len()
        );

        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Ok(Self {
            shared: Arc::new(Shared {
                path,
                pretty: config.pretty_json,
                quota: config.quota,
                data: Mutex::new(data),
                sender,
            }),
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Mutate the data under the lock, flush, then publish before unlocking
    fn mutate<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Value>) -> Result<StorageChanges>,
    {
        let mut data = self.shared.data.lock();
        let mut next = data.clone();
        let changes = op(&mut next)?;
        if changes.is_empty() {
            return Ok(());
        }
        self.flush(&next)?;
        *data = next;

        // Still holding the lock, so subscribers see batches in commit order
        if self.shared.sender.send(changes).is_err() {
            debug!("No subscribers for file store changes");
        }
        Ok(())
    }

    fn flush(&self, data: &HashMap<String, Value>) -> Result<()> {
        let content = if self.shared.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };

        let path = &self.shared.path;
        let file_name = path.file_name().ok_or_else(|| {
            Error::Config(format!(
                "Invalid path '{}': must have a filename",
                path.display()
            ))
        })?;
        let mut temp_filename = file_name.to_os_string();
        temp_filename.push(".tmp");
        let temp_path = path.with_file_name(temp_filename);

        std::fs::write(&temp_path, &content).map_err(|e| Error::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, path).map_err(|e| Error::FileWrite {
            path: path.clone(),
            source: e,
        })
    }
}

fn read_store_file(path: &Path) -> Result<HashMap<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(&content).map_err(|e| Error::parse(&path.display().to_string(), e))
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    fn area_name(&self) -> &str {
        "file"
    }

    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let data = self.shared.data.lock();
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.shared.data.lock().clone())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        let quota = self.shared.quota;
        self.mutate(move |data| {
            quota.check(data, &items)?;
            Ok(apply_set(data, items))
        })
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        self.mutate(|data| Ok(apply_remove(data, keys)))
    }

    async fn clear(&self) -> Result<()> {
        self.mutate(|data| {
            let mut changes = StorageChanges::new();
            for (key, old) in data.drain() {
                changes.record(key, Some(old), None);
            }
            Ok(changes)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.shared.sender.subscribe()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Change listeners for profile data
//!
//! Raw callback registration on top of the store's change subscription, for
//! consumers that don't want a stream. Each listener runs on its own tokio task
//! and is stopped when its [`ListenerHandle`] is removed or dropped.
//!
//! This module also classifies change batches into [`ProfileEvent`]s, and holds
//! the active-profile tracking shared with [`crate::streams`].

use crate::error::{Error, Result};
use crate::profiles::manager::{decode_active_id, decode_id_list};
use crate::profiles::{
    is_reserved_key, ActiveProfileChange, Profile, ProfileId, ProfileManager, ValueChange,
    ACTIVE_PROFILE_ID_KEY, PROFILE_ID_LIST_KEY,
};
use crate::store::{KeyValueStore, StorageChanges};

use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

// =============================================================================
// Listener Handle
// =============================================================================

/// Keeps a registered listener alive
///
/// Dropping the handle stops delivery, so keep it for as long as the callback
/// should run.
#[derive(Debug)]
#[must_use = "dropping a ListenerHandle removes the listener"]
pub struct ListenerHandle {
    task: JoinHandle<()>,
    label: &'static str,
}

impl ListenerHandle {
    /// Stop delivering changes to the callback
    pub fn remove(self) {
        // Drop aborts the task
    }

    /// Check whether the listener is still receiving changes
    ///
    /// Returns `false` once the store's change channel has closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        debug!("Removing {} listener", self.label);
        self.task.abort();
    }
}

fn spawn_listener<F>(label: &'static str, future: F) -> Result<ListenerHandle>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Config(format!("Listeners require a tokio runtime: {e}")))?;

    debug!("Registering {label} listener");
    Ok(ListenerHandle {
        task: runtime.spawn(future),
        label,
    })
}

/// Receive the next batch, skipping over lag; `None` once the channel closes
pub(crate) async fn next_batch(receiver: &mut Receiver<StorageChanges>, label: &str) -> Option<StorageChanges> {
    loop {
        match receiver.recv().await {
            Ok(changes) => return Some(changes),
            Err(RecvError::Lagged(n)) => {
                warn!("{label} listener lagged by {n} change batches");
            }
            Err(RecvError::Closed) => {
                debug!("Change channel closed, stopping {label} listener");
                return None;
            }
        }
    }
}

// =============================================================================
// Raw Listeners
// =============================================================================

impl<S: KeyValueStore> ProfileManager<S> {
    /// Call `callback` whenever the profile list changes
    ///
    /// A stored list that can't be decoded is passed as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn add_profile_id_list_listener<F>(&self, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(ValueChange<Vec<ProfileId>>) + Send + Sync + 'static,
    {
        let mut receiver = self.store().subscribe();

        spawn_listener("profile list", async move {
            while let Some(changes) = next_batch(&mut receiver, "profile list").await {
                let Some(change) = changes.get(PROFILE_ID_LIST_KEY) else {
                    continue;
                };
                callback(ValueChange {
                    new_value: decode_list_lenient(change.new_value.as_ref()),
                    old_value: decode_list_lenient(change.old_value.as_ref()),
                });
            }
        })
    }

    /// Call `callback` whenever the active profile id changes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn add_active_profile_id_listener<F>(&self, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(ValueChange<String>) + Send + Sync + 'static,
    {
        let mut receiver = self.store().subscribe();

        spawn_listener("active profile id", async move {
            while let Some(changes) = next_batch(&mut receiver, "active profile id").await {
                let Some(change) = changes.get(ACTIVE_PROFILE_ID_KEY) else {
                    continue;
                };
                callback(ValueChange {
                    new_value: change.new_value.as_ref().and_then(value_to_id),
                    old_value: change.old_value.as_ref().and_then(value_to_id),
                });
            }
        })
    }

    /// Call `callback` whenever the active profile switches or its record changes
    ///
    /// A switch and an edit look the same to the callback: both carry the profile
    /// now in effect. After missed batches the profile is re-read and delivered
    /// without an `old_profile`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn add_active_profile_listener<F>(&self, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(ActiveProfileChange) + Send + Sync + 'static,
    {
        let mut receiver = self.store().subscribe();
        let manager = self.clone();

        spawn_listener("active profile", async move {
            let mut watch = match ActiveProfileWatch::start(manager).await {
                Ok((watch, _)) => watch,
                Err(e) => {
                    warn!("Active profile listener failed to start: {e}");
                    return;
                }
            };

            loop {
                let change = match receiver.recv().await {
                    Ok(changes) => watch.apply(&changes).await,
                    Err(RecvError::Lagged(n)) => {
                        // A missed batch may have switched profiles
                        warn!("Active profile listener lagged by {n} change batches, resyncing");
                        watch.resync().await.map(|new_profile| {
                            Some(ActiveProfileChange {
                                new_profile,
                                old_profile: None,
                            })
                        })
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change channel closed, stopping active profile listener");
                        return;
                    }
                };

                match change {
                    Ok(Some(change)) => callback(change),
                    Ok(None) => {}
                    Err(e) => warn!("Active profile listener skipped a change: {e}"),
                }
            }
        })
    }
}

fn decode_list_lenient(raw: Option<&Value>) -> Option<Vec<ProfileId>> {
    let raw = raw?;
    match decode_id_list(Some(raw)) {
        Ok(list) => Some(list),
        Err(e) => {
            warn!("Ignoring unreadable profile list in change: {e}");
            None
        }
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

// =============================================================================
// Active Profile Tracking
// =============================================================================

/// Follows the active profile across change batches
///
/// Remembers the active id so edits of the active record can be recognized
/// without fetching anything.
pub(crate) struct ActiveProfileWatch<S: KeyValueStore> {
    manager: ProfileManager<S>,
    active_id: String,
}

impl<S: KeyValueStore> ActiveProfileWatch<S> {
    /// Read the current active profile and start tracking it
    pub(crate) async fn start(manager: ProfileManager<S>) -> Result<(Self, Profile)> {
        let mut watch = Self {
            manager,
            active_id: String::new(),
        };
        let profile = watch.resync().await?;
        Ok((watch, profile))
    }

    /// Re-read the active profile, e.g. after missed batches
    pub(crate) async fn resync(&mut self) -> Result<Profile> {
        self.active_id = self.manager.get_active_profile_id().await?;
        self.manager.resolve_profile(&self.active_id).await
    }

    /// Apply one batch, returning the new active profile if it is affected
    ///
    /// Clearing the active id yields nothing; the id written next does.
    pub(crate) async fn apply(&mut self, changes: &StorageChanges) -> Result<Option<ActiveProfileChange>> {
        if let Some(change) = changes.get(ACTIVE_PROFILE_ID_KEY) {
            let new_id = decode_active_id(change.new_value.as_ref());
            let old_id = decode_active_id(change.old_value.as_ref());
            self.active_id = new_id.clone();
            if new_id.is_empty() {
                // Unset in between writes (e.g. a reset); the next id drives the value
                return Ok(None);
            }
            return self.switched(changes, &new_id, &old_id).await.map(Some);
        }

        if self.active_id.is_empty() {
            return Ok(None);
        }
        let Some(change) = changes.get(&self.active_id) else {
            return Ok(None);
        };

        let id = self.active_id.as_str();
        let new_profile = match &change.new_value {
            Some(raw) => self.manager.decode_profile(raw, id),
            None => {
                self.manager
                    .diagnose(|| format!("Record of active profile '{id}' was removed"));
                self.manager.defaults().get_default_profile(Some(id))
            }
        };
        let old_profile = change
            .old_value
            .as_ref()
            .map(|raw| self.manager.decode_profile(raw, id));

        Ok(Some(ActiveProfileChange {
            new_profile,
            old_profile,
        }))
    }

    async fn switched(&self, changes: &StorageChanges, new_id: &str, old_id: &str) -> Result<ActiveProfileChange> {
        // The new record arrived in the same batch
        if let Some(raw) = changes.get(new_id).and_then(|c| c.new_value.as_ref()) {
            return Ok(ActiveProfileChange {
                new_profile: self.manager.decode_profile(raw, new_id),
                old_profile: self.old_profile_from_batch(changes, old_id),
            });
        }

        let keys: Vec<&str> = if old_id.is_empty() {
            vec![new_id]
        } else {
            vec![new_id, old_id]
        };
        let records: HashMap<String, Value> = self.manager.store().get(&keys).await?;

        let new_profile = match records.get(new_id) {
            Some(raw) => self.manager.decode_profile(raw, new_id),
            None => {
                self.manager
                    .diagnose(|| format!("Active profile '{new_id}' has no record"));
                self.manager.defaults().get_default_profile(Some(new_id))
            }
        };
        let old_profile = records
            .get(old_id)
            .map(|raw| self.manager.decode_profile(raw, old_id));

        Ok(ActiveProfileChange {
            new_profile,
            old_profile,
        })
    }

    fn old_profile_from_batch(&self, changes: &StorageChanges, old_id: &str) -> Option<Profile> {
        if old_id.is_empty() {
            return None;
        }
        let change = changes.get(old_id)?;
        change
            .new_value
            .as_ref()
            .or(change.old_value.as_ref())
            .map(|raw| self.manager.decode_profile(raw, old_id))
    }
}

// =============================================================================
// Profile Events
// =============================================================================

/// A profile-level change derived from a store change batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    /// A profile was appended to the list
    Added { profile: ProfileId },
    /// A profile was dropped from the list
    Removed { id: String },
    /// A listed profile's display name changed
    Renamed { id: String, from: String, to: String },
    /// The list kept its profiles but changed their order
    Reordered,
    /// The active profile id changed (empty means unset)
    Switched { from: String, to: String },
    /// A profile record was written with new content
    Updated { id: String },
}

/// Classify a change batch into profile events
///
/// List events come first in list order, then a switch, then record updates
/// sorted by id. Records written for a profile added in the same batch are not
/// reported as updates.
#[must_use]
pub fn classify(changes: &StorageChanges) -> Vec<ProfileEvent> {
    let mut events = Vec::new();
    let mut added_ids = Vec::new();

    if let Some(change) = changes.get(PROFILE_ID_LIST_KEY) {
        let old = decode_list_lenient(change.old_value.as_ref()).unwrap_or_default();
        let new = decode_list_lenient(change.new_value.as_ref()).unwrap_or_default();

        for entry in &new {
            match old.iter().find(|o| o.id == entry.id) {
                None => {
                    added_ids.push(entry.id.clone());
                    events.push(ProfileEvent::Added {
                        profile: entry.clone(),
                    });
                }
                Some(previous) if previous.name != entry.name => {
                    events.push(ProfileEvent::Renamed {
                        id: entry.id.clone(),
                        from: previous.name.clone(),
                        to: entry.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for entry in &old {
            if !new.iter().any(|n| n.id == entry.id) {
                events.push(ProfileEvent::Removed {
                    id: entry.id.clone(),
                });
            }
        }

        let kept_old: Vec<&str> = old
            .iter()
            .map(|p| p.id.as_str())
            .filter(|id| new.iter().any(|n| n.id == *id))
            .collect();
        let kept_new: Vec<&str> = new
            .iter()
            .map(|p| p.id.as_str())
            .filter(|id| old.iter().any(|o| o.id == *id))
            .collect();
        if kept_old != kept_new {
            events.push(ProfileEvent::Reordered);
        }
    }

    if let Some(change) = changes.get(ACTIVE_PROFILE_ID_KEY) {
        events.push(ProfileEvent::Switched {
            from: decode_active_id(change.old_value.as_ref()),
            to: decode_active_id(change.new_value.as_ref()),
        });
    }

    let mut updated: Vec<&str> = changes
        .keys()
        .filter(|key| !is_reserved_key(key))
        .filter(|key| !added_ids.iter().any(|id| id.as_str() == *key))
        .filter(|key| {
            changes
                .get(key)
                .and_then(|c| c.new_value.as_ref())
                .and_then(|v| v.get("id"))
                .and_then(Value::as_str)
                == Some(*key)
        })
        .collect();
    updated.sort_unstable();
    events.extend(
        updated
            .into_iter()
            .map(|id| ProfileEvent::Updated { id: id.to_string() }),
    );

    events
}

// =============================================================================
// Tests
// =============================================================================

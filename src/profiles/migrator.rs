//! Profile initialization and legacy migration
//!
//! [`ProfileManager::init_profiles`] runs once per context at startup and brings
//! the store into a consistent state, whatever it held before:
//!
//! 1. **Current layout**: a non-empty `profileIDList` is kept as-is; listed
//!    profiles without a record get a default one.
//! 2. **Legacy layout**: `configProfileIDs` (plus `activeConfigID`) is converted
//!    into the current layout, preserving order. A legacy record's `name` field
//!    becomes the list entry's name.
//! 3. **Empty store**: a single default profile is generated.
//!
//! Afterwards the active id is corrected to a listed profile, the list and the
//! active id are written in one batch and every record is written on its own,
//! which keeps each write under the per-item size limit of synced areas.

use crate::error::Result;
use crate::profiles::manager::{decode_active_id, decode_id_list, ProfileManager};
use crate::profiles::types::{Profile, ProfileId, ProfilesStorage};
use crate::profiles::{
    is_reserved_key, ACTIVE_PROFILE_ID_KEY, LEGACY_ACTIVE_ID_KEY, LEGACY_ID_LIST_KEY,
    PROFILE_ID_LIST_KEY,
};
use crate::store::KeyValueStore;

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Which layout [`ProfileManager::init_profiles_with_outcome`] found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The current layout was already present
    Current,
    /// The legacy layout was converted
    Legacy {
        /// Number of profiles carried over
        migrated: usize,
    },
    /// Nothing usable was stored; a default profile was generated
    Fresh,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current layout"),
            Self::Legacy { migrated } => write!(f, "legacy layout ({migrated} profiles migrated)"),
            Self::Fresh => write!(f, "fresh layout"),
        }
    }
}

/// Profiles resolved by one of the init branches, before the active id is fixed
struct Resolved {
    storage: ProfilesStorage,
    active_id: Option<String>,
}

impl<S: KeyValueStore> ProfileManager<S> {
    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize profile storage and return the active profile
    ///
    /// Safe to call on every startup: on a consistent store it rewrites the same
    /// values, which publishes no change events. Must not run concurrently with
    /// itself in the same context.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails. Writes are not retried, so a
    /// failure may leave the store partially updated.
    pub async fn init_profiles(&self) -> Result<Profile> {
        let (profile, _) = self.init_profiles_with_outcome().await?;
        Ok(profile)
    }

    /// Like [`init_profiles`](Self::init_profiles), also reporting which layout
    /// was found
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub async fn init_profiles_with_outcome(&self) -> Result<(Profile, MigrationOutcome)> {
        let stored = self
            .store()
            .get(&[
                PROFILE_ID_LIST_KEY,
                ACTIVE_PROFILE_ID_KEY,
                LEGACY_ID_LIST_KEY,
                LEGACY_ACTIVE_ID_KEY,
            ])
            .await?;

        let list = match decode_id_list(stored.get(PROFILE_ID_LIST_KEY)) {
            Ok(list) => list,
            Err(e) => {
                warn!("Ignoring unreadable profile list: {e}");
                Vec::new()
            }
        };

        let (resolved, outcome) = if !list.is_empty() {
            let active_id = non_empty(decode_active_id(stored.get(ACTIVE_PROFILE_ID_KEY)));
            let resolved = self.load_current(list, active_id).await?;
            (resolved, MigrationOutcome::Current)
        } else if let Some(legacy_ids) = legacy_id_list(stored.get(LEGACY_ID_LIST_KEY)) {
            let legacy_active = non_empty(decode_active_id(stored.get(LEGACY_ACTIVE_ID_KEY)));
            let resolved = self.load_legacy(&legacy_ids, legacy_active).await?;
            let migrated = resolved.storage.profiles.len();
            (resolved, MigrationOutcome::Legacy { migrated })
        } else {
            (self.generate_fresh(), MigrationOutcome::Fresh)
        };

        let profile = self.persist(resolved).await?;
        info!(
            "Profiles initialized from {outcome}, active profile '{}'",
            profile.id
        );
        Ok((profile, outcome))
    }

    /// Delete all profiles and start over with a single default profile
    ///
    /// Removes every listed record along with the list and active id keys. With
    /// `reset_removes_legacy` set, legacy keys and the records they list are
    /// removed too.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub async fn reset_all_profiles(&self) -> Result<Profile> {
        let stored = self
            .store()
            .get(&[PROFILE_ID_LIST_KEY, LEGACY_ID_LIST_KEY])
            .await?;

        let mut keys: Vec<String> = match decode_id_list(stored.get(PROFILE_ID_LIST_KEY)) {
            Ok(list) => list.into_iter().map(|p| p.id).collect(),
            Err(e) => {
                warn!("Resetting over an unreadable profile list: {e}");
                Vec::new()
            }
        };
        keys.push(PROFILE_ID_LIST_KEY.to_string());
        keys.push(ACTIVE_PROFILE_ID_KEY.to_string());

        if self.config().reset_removes_legacy {
            keys.extend(legacy_id_list(stored.get(LEGACY_ID_LIST_KEY)).unwrap_or_default());
            keys.push(LEGACY_ID_LIST_KEY.to_string());
            keys.push(LEGACY_ACTIVE_ID_KEY.to_string());
        }

        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.store().remove(&key_refs).await?;
        info!("Removed {} keys, resetting profiles", key_refs.len());

        self.persist(self.generate_fresh()).await
    }

    // =========================================================================
    // Branches
    // =========================================================================

    async fn load_current(&self, mut list: Vec<ProfileId>, active_id: Option<String>) -> Result<Resolved> {
        list.retain(|entry| {
            let reserved = is_reserved_key(&entry.id);
            if reserved {
                warn!("Dropping listed profile '{}', the id is a reserved key", entry.id);
            }
            !reserved
        });

        let keys: Vec<&str> = list.iter().map(|p| p.id.as_str()).collect();
        let records = self.store().get(&keys).await?;

        let profiles = list
            .iter()
            .map(|entry| match records.get(&entry.id) {
                Some(raw) => self.decode_profile(raw, &entry.id),
                None => {
                    self.diagnose(|| format!("Listed profile '{}' has no record", entry.id));
                    self.defaults().get_default_profile(Some(&entry.id))
                }
            })
            .collect();

        debug!("Loaded {} profiles from the current layout", list.len());
        Ok(Resolved {
            storage: ProfilesStorage {
                profile_id_list: list,
                profiles,
            },
            active_id,
        })
    }

    async fn load_legacy(&self, legacy_ids: &[String], legacy_active: Option<String>) -> Result<Resolved> {
        info!("Migrating {} profiles from the legacy layout", legacy_ids.len());

        let keys: Vec<&str> = legacy_ids.iter().map(String::as_str).collect();
        let records = self.store().get(&keys).await?;

        let mut seen = HashSet::new();
        let mut profile_id_list = Vec::with_capacity(legacy_ids.len());
        let mut profiles = Vec::with_capacity(legacy_ids.len());
        let mut active_id = None;

        for id in legacy_ids {
            if is_reserved_key(id) {
                warn!("Skipping legacy profile '{id}', the id is a reserved key");
                continue;
            }
            if !seen.insert(id.as_str()) {
                self.diagnose(|| format!("Legacy profile list contains '{id}' twice"));
                continue;
            }

            let (profile_id, profile) = match records.get(id) {
                Some(raw) => self.migrate_legacy_record(id, raw),
                None => {
                    debug!("Legacy profile '{id}' has no record, using defaults");
                    (
                        self.defaults().get_default_profile_id(Some(id)),
                        self.defaults().get_default_profile(Some(id)),
                    )
                }
            };

            if legacy_active.as_deref() == Some(id.as_str()) {
                active_id = Some(profile_id.id.clone());
            }
            profile_id_list.push(profile_id);
            profiles.push(profile);
        }

        Ok(Resolved {
            storage: ProfilesStorage {
                profile_id_list,
                profiles,
            },
            active_id,
        })
    }

    /// Split a legacy record into its list entry and a merged profile
    fn migrate_legacy_record(&self, id: &str, raw: &Value) -> (ProfileId, Profile) {
        let mut raw = raw.clone();
        let name = raw
            .as_object_mut()
            .and_then(|obj| obj.remove("name"))
            .and_then(|name| name.as_str().map(str::to_string))
            .filter(|name| !name.is_empty());

        let profile_id = match name {
            Some(name) => ProfileId::new(id, name),
            None => self.defaults().get_default_profile_id(Some(id)),
        };
        (profile_id, self.decode_profile(&raw, id))
    }

    fn generate_fresh(&self) -> Resolved {
        Resolved {
            storage: self.defaults().gen_profiles_storage(),
            active_id: None,
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Fix the active id, write everything back and return the active profile
    async fn persist(&self, resolved: Resolved) -> Result<Profile> {
        let Resolved {
            mut storage,
            active_id,
        } = resolved;

        if storage.profiles.is_empty() {
            warn!("No profiles resolved during init, generating a default");
            storage = self.defaults().gen_profiles_storage();
        }

        let index = active_id
            .as_deref()
            .and_then(|id| storage.profiles.iter().position(|p| p.id == id));
        if index.is_none() {
            if let Some(id) = active_id.as_deref() {
                warn!("Active profile '{id}' is not listed, using the first profile");
            }
        }
        let active = storage.profiles[index.unwrap_or(0)].clone();

        self.store()
            .set(HashMap::from([
                (
                    PROFILE_ID_LIST_KEY.to_string(),
                    serde_json::to_value(&storage.profile_id_list)?,
                ),
                (
                    ACTIVE_PROFILE_ID_KEY.to_string(),
                    Value::String(active.id.clone()),
                ),
            ]))
            .await?;

        for profile in &storage.profiles {
            self.store().set_one(&profile.id, profile.to_value()?).await?;
        }

        Ok(active)
    }
}

/// Decode the legacy id list; `None` unless it is a non-empty array of strings
fn legacy_id_list(raw: Option<&Value>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .as_array()?
        .iter()
        .filter_map(|id| id.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn non_empty(id: String) -> Option<String> {
    (!id.is_empty()).then_some(id)
}

// =============================================================================
// Tests
// =============================================================================

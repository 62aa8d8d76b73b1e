//! Profile manager implementation
//!
//! Repository operations (read, update, add, remove, rename, duplicate) and the
//! active profile pointer, all going straight to the store.

use crate::config::ProfilesConfig;
use crate::error::{Error, Result};
use crate::profiles::defaults::ProfileDefaults;
use crate::profiles::types::{Profile, ProfileId};
use crate::profiles::{is_reserved_key, ACTIVE_PROFILE_ID_KEY, DIAGNOSTICS_TARGET, PROFILE_ID_LIST_KEY};
use crate::store::KeyValueStore;

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// =============================================================================
// Profile Manager
// =============================================================================

/// Manages the profiles stored in a [`KeyValueStore`]
///
/// The manager keeps no copy of the data; every call reads or writes the store,
/// which may also be modified by other contexts. Cloning is cheap and clones
/// share the same store handle.
pub struct ProfileManager<S: KeyValueStore> {
    store: Arc<S>,
    config: Arc<ProfilesConfig>,
    defaults: Arc<ProfileDefaults>,
}

impl<S: KeyValueStore> Clone for ProfileManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            defaults: Arc::clone(&self.defaults),
        }
    }
}

impl<S: KeyValueStore> ProfileManager<S> {
    /// Create a builder for `ProfileManager` with a fluent API.
    ///
    /// # Example
    ///
    /// ```rust
    /// use profile_sync::{MemoryStore, ProfileManager};
    /// use serde_json::json;
    ///
    /// let manager = ProfileManager::builder(MemoryStore::new())
    ///     .with_defaults(json!({"theme": "dark"}))
    ///     .diagnostics(true)
    ///     .build()?;
    /// # Ok::<(), profile_sync::Error>(())
    /// ```
    pub fn builder(store: S) -> ProfileManagerBuilder<S> {
        ProfileManagerBuilder::new(store)
    }

    /// Create a new profile manager over `store`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(store: S, config: ProfilesConfig) -> Result<Self> {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Create a profile manager over an already shared store handle
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_shared_store(store: Arc<S>, config: ProfilesConfig) -> Result<Self> {
        config.validate()?;
        let defaults = ProfileDefaults::from_config(&config);

        debug!(
            "Initialized ProfileManager on '{}' store (diagnostics: {})",
            store.area_name(),
            config.diagnostics
        );

        Ok(Self {
            store,
            config: Arc::new(config),
            defaults: Arc::new(defaults),
        })
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration
    pub fn config(&self) -> &ProfilesConfig {
        &self.config
    }

    /// Default profile factory and merge transform
    pub fn defaults(&self) -> &ProfileDefaults {
        &self.defaults
    }

    /// Log a consistency diagnostic when diagnostics are enabled
    pub(crate) fn diagnose<F>(&self, message: F)
    where
        F: FnOnce() -> String,
    {
        if self.config.diagnostics {
            warn!(target: DIAGNOSTICS_TARGET, "{}", message());
        }
    }

    /// Profile records share the store with the bookkeeping keys
    fn check_record_id(id: &str) -> Result<()> {
        if is_reserved_key(id) {
            return Err(Error::ReservedProfileId(id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Profile Records
    // =========================================================================

    /// Get a profile record, merged with the current defaults
    ///
    /// Returns `None` if the record is absent; no default is synthesized.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let raw = self.store.get_one(id).await?;
        Ok(raw.map(|raw| self.decode_profile(&raw, id)))
    }

    /// Overwrite the record stored under `profile.id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedProfileId`] if `profile.id` is a bookkeeping key,
    /// or an error if the store write fails (e.g., quota exceeded).
    pub async fn update_profile(&self, profile: &Profile) -> Result<()> {
        Self::check_record_id(&profile.id)?;
        if self.config.diagnostics {
            let list = self.get_profile_id_list().await?;
            if !list.iter().any(|p| p.id == profile.id) {
                self.diagnose(|| format!("Updating profile '{}' which is not listed", profile.id));
            }
        }

        self.store.set_one(&profile.id, profile.to_value()?).await?;
        debug!("Updated profile '{}'", profile.id);
        Ok(())
    }

    /// Append `profile_id` to the list and store a default record for it
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedProfileId`] if the id is a bookkeeping key, or an
    /// error if a store operation fails.
    pub async fn add_profile(&self, profile_id: ProfileId) -> Result<Profile> {
        Self::check_record_id(&profile_id.id)?;
        let mut list = self.get_profile_id_list().await?;
        if list.iter().any(|p| p.id == profile_id.id) {
            self.diagnose(|| format!("Adding profile '{}' which is already listed", profile_id.id));
        }

        let profile = self.defaults.get_default_profile(Some(&profile_id.id));
        info!("Added profile '{}' ({})", profile_id.id, profile_id.name);
        list.push(profile_id);

        self.store
            .set(HashMap::from([
                (PROFILE_ID_LIST_KEY.to_string(), serde_json::to_value(&list)?),
                (profile.id.clone(), profile.to_value()?),
            ]))
            .await?;

        Ok(profile)
    }

    /// Remove a profile from the list and delete its record
    ///
    /// If the profile is active, the first remaining profile becomes active
    /// before the list is rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotRemoveLastProfile`] if `id` is the only listed
    /// profile, or an error if a store operation fails.
    pub async fn remove_profile(&self, id: &str) -> Result<()> {
        let stored = self
            .store
            .get(&[ACTIVE_PROFILE_ID_KEY, PROFILE_ID_LIST_KEY])
            .await?;
        let active_id = decode_active_id(stored.get(ACTIVE_PROFILE_ID_KEY));
        let list = decode_id_list(stored.get(PROFILE_ID_LIST_KEY))?;

        let was_listed = list.iter().any(|p| p.id == id);
        let remaining: Vec<ProfileId> = list.into_iter().filter(|p| p.id != id).collect();

        if !was_listed {
            self.diagnose(|| format!("Removing profile '{id}' which is not listed"));
        }

        if was_listed {
            let Some(first) = remaining.first() else {
                return Err(Error::CannotRemoveLastProfile(id.to_string()));
            };

            if active_id == id {
                info!("Active profile '{id}' removed, switching to '{}'", first.id);
                self.store
                    .set_one(ACTIVE_PROFILE_ID_KEY, Value::String(first.id.clone()))
                    .await?;
            }

            self.store
                .set_one(PROFILE_ID_LIST_KEY, serde_json::to_value(&remaining)?)
                .await?;
        }

        self.store.remove(&[id]).await?;
        info!("Removed profile '{id}'");
        Ok(())
    }

    /// Change the display name of a listed profile
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] if `id` is not listed.
    pub async fn rename_profile(&self, id: &str, name: impl Into<String>) -> Result<()> {
        let mut list = self.get_profile_id_list().await?;
        let entry = list
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::ProfileNotFound(id.to_string()))?;

        let name = name.into();
        info!("Renamed profile '{id}': '{}' -> '{name}'", entry.name);
        entry.name = name;

        self.update_profile_id_list(&list).await
    }

    /// Copy a profile's record to a new list entry
    ///
    /// A listed source without a record is copied as a default profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] if the source neither is listed nor has
    /// a record, [`Error::ProfileAlreadyExists`] if `target.id` is listed, or
    /// [`Error::ReservedProfileId`] if `target.id` is a bookkeeping key.
    pub async fn duplicate_profile(&self, source_id: &str, target: ProfileId) -> Result<Profile> {
        Self::check_record_id(&target.id)?;
        let mut list = self.get_profile_id_list().await?;
        if list.iter().any(|p| p.id == target.id) {
            return Err(Error::ProfileAlreadyExists(target.id));
        }

        let source = match self.get_profile(source_id).await? {
            Some(profile) => profile,
            None if list.iter().any(|p| p.id == source_id) => {
                self.diagnose(|| format!("Listed profile '{source_id}' has no record"));
                self.defaults.get_default_profile(Some(source_id))
            }
            None => return Err(Error::ProfileNotFound(source_id.to_string())),
        };

        let copy = Profile::new(target.id.clone(), source.options);
        info!("Duplicated profile '{source_id}' -> '{}'", target.id);
        list.push(target);

        self.store
            .set(HashMap::from([
                (PROFILE_ID_LIST_KEY.to_string(), serde_json::to_value(&list)?),
                (copy.id.clone(), copy.to_value()?),
            ]))
            .await?;

        Ok(copy)
    }

    /// Set one option of a profile by dotted path and store the result
    ///
    /// This is the write path for form fields bound to a profile. A missing
    /// record is started from defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or a store operation fails.
    pub async fn set_profile_field(&self, id: &str, path: &str, value: Value) -> Result<Profile> {
        let mut profile = match self.get_profile(id).await? {
            Some(profile) => profile,
            None => self.defaults.get_default_profile(Some(id)),
        };
        profile.set(path, value)?;
        self.update_profile(&profile).await?;
        Ok(profile)
    }

    // =========================================================================
    // Profile ID List
    // =========================================================================

    /// Get the ordered profile catalog (empty if none is stored)
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or the stored list is malformed.
    pub async fn get_profile_id_list(&self) -> Result<Vec<ProfileId>> {
        let raw = self.store.get_one(PROFILE_ID_LIST_KEY).await?;
        decode_id_list(raw.as_ref())
    }

    /// Overwrite the profile catalog
    ///
    /// No validation is performed; callers keep ids unique.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn update_profile_id_list(&self, list: &[ProfileId]) -> Result<()> {
        if self.config.diagnostics {
            let mut seen = HashSet::new();
            for entry in list {
                if !seen.insert(entry.id.as_str()) {
                    self.diagnose(|| format!("Profile list contains '{}' twice", entry.id));
                }
            }
        }

        self.store
            .set_one(PROFILE_ID_LIST_KEY, serde_json::to_value(list)?)
            .await
    }

    // =========================================================================
    // Active Profile
    // =========================================================================

    /// Get the active profile id (empty string if unset)
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn get_active_profile_id(&self) -> Result<String> {
        let raw = self.store.get_one(ACTIVE_PROFILE_ID_KEY).await?;
        Ok(decode_active_id(raw.as_ref()))
    }

    /// Set the active profile id
    ///
    /// The id is written as given; keeping it listed is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn update_active_profile_id(&self, id: &str) -> Result<()> {
        if self.config.diagnostics {
            let list = self.get_profile_id_list().await?;
            if !list.iter().any(|p| p.id == id) {
                self.diagnose(|| format!("Activating profile '{id}' which is not listed"));
            }
        }

        self.store
            .set_one(ACTIVE_PROFILE_ID_KEY, Value::String(id.to_string()))
            .await?;
        info!("Active profile set to '{id}'");
        Ok(())
    }

    /// Get the active profile, falling back to a default profile
    ///
    /// Never returns "no profile": an unset id or a missing record yields a
    /// synthesized default.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn get_active_profile(&self) -> Result<Profile> {
        let id = self.get_active_profile_id().await?;
        self.resolve_profile(&id).await
    }

    /// Load the profile for `id`, synthesizing a default when needed
    pub(crate) async fn resolve_profile(&self, id: &str) -> Result<Profile> {
        if id.is_empty() {
            self.diagnose(|| "No active profile id is set".to_string());
            return Ok(self.defaults.get_default_profile(None));
        }

        match self.get_profile(id).await? {
            Some(profile) => Ok(profile),
            None => {
                self.diagnose(|| format!("Active profile '{id}' has no record"));
                Ok(self.defaults.get_default_profile(Some(id)))
            }
        }
    }

    /// Merge a raw record, keeping the storage key as its id
    pub(crate) fn decode_profile(&self, raw: &Value, key: &str) -> Profile {
        let mut profile = self.defaults.merge_profile(raw, key);
        if profile.id != key {
            self.diagnose(|| format!("Record under '{key}' carries id '{}'", profile.id));
            profile.id = key.to_string();
        }
        profile
    }
}

// =============================================================================
// Decoding Helpers
// =============================================================================

/// Decode a stored profile list; absent means empty
pub(crate) fn decode_id_list(raw: Option<&Value>) -> Result<Vec<ProfileId>> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::parse(PROFILE_ID_LIST_KEY, e)),
    }
}

/// Decode a stored active id; anything but a string reads as unset
pub(crate) fn decode_active_id(raw: Option<&Value>) -> String {
    raw.and_then(Value::as_str).unwrap_or_default().to_string()
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for creating a [`ProfileManager`] with a fluent API.
pub struct ProfileManagerBuilder<S: KeyValueStore> {
    store: S,
    config: ProfilesConfig,
}

impl<S: KeyValueStore> ProfileManagerBuilder<S> {
    /// Create a new builder over `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: ProfilesConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ProfilesConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the option fields new profiles start from.
    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.config.profile_defaults = defaults;
        self
    }

    /// Set the display name of generated profiles.
    pub fn default_profile_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_profile_name = name.into();
        self
    }

    /// Enable or disable consistency diagnostics.
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.config.diagnostics = enabled;
        self
    }

    /// Remove legacy data when resetting all profiles.
    pub fn reset_removes_legacy(mut self, enabled: bool) -> Self {
        self.config.reset_removes_legacy = enabled;
        self
    }

    /// Build the [`ProfileManager`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<ProfileManager<S>> {
        ProfileManager::new(self.store, self.config)
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Profile data types

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Matches display names of the form `%%_<key>_%%`
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%%_([A-Za-z0-9_\-.]+?)_%%$").expect("placeholder pattern is valid")
});

// =============================================================================
// Profile ID
// =============================================================================

/// Entry of the profile ID list: a stable id plus a display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId {
    /// Stable, unique, opaque identifier (also the storage key of the record)
    pub id: String,

    /// Display label, possibly a `%%_<key>_%%` translation placeholder
    pub name: String,
}

impl ProfileId {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Translation key if the name is a `%%_<key>_%%` placeholder
    ///
    /// ```rust
    /// use profile_sync::ProfileId;
    ///
    /// assert_eq!(ProfileId::new("a", "%%_default_%%").placeholder_key(), Some("default"));
    /// assert_eq!(ProfileId::new("a", "Work").placeholder_key(), None);
    /// ```
    #[must_use]
    pub fn placeholder_key(&self) -> Option<&str> {
        PLACEHOLDER_RE
            .captures(&self.name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Name to show in the UI, resolving placeholders through `translate`
    pub fn display_name<F>(&self, translate: F) -> String
    where
        F: FnOnce(&str) -> String,
    {
        match self.placeholder_key() {
            Some(key) => translate(key),
            None => self.name.clone(),
        }
    }
}

// =============================================================================
// Profile
// =============================================================================

/// A profile record: its id plus an opaque set of option fields
///
/// Stored flattened, i.e. `{"id": "...", "waveform": true, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Profile {
    pub fn new(id: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            options,
        }
    }

    /// Get an option by dotted path (e.g., "mode.holding.shift")
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.options.get(first)?, |value, part| value.get(part))
    }

    /// Set an option by dotted path, creating intermediate objects as needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFieldPath`] for empty segments, for the reserved
    /// top-level `id` field, or when an intermediate value is not an object.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidFieldPath(path.to_string()));
        }
        let Some((last, parents)) = parts.split_last() else {
            return Err(Error::InvalidFieldPath(path.to_string()));
        };
        if parents.is_empty() && *last == "id" {
            return Err(Error::InvalidFieldPath(format!(
                "{path}: the profile id cannot be set as an option"
            )));
        }

        let mut current = &mut self.options;
        for part in parents {
            let entry = current
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = entry.as_object_mut().ok_or_else(|| {
                Error::InvalidFieldPath(format!("{path}: '{part}' is not an object"))
            })?;
        }
        current.insert((*last).to_string(), value);
        Ok(())
    }

    /// Serialize into the stored record shape
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A complete, freshly generated profile layout
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilesStorage {
    pub profile_id_list: Vec<ProfileId>,
    pub profiles: Vec<Profile>,
}

// =============================================================================
// Change Payloads
// =============================================================================

/// Old and new value of a watched key, already deserialized
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange<T> {
    pub new_value: Option<T>,
    pub old_value: Option<T>,
}

/// Change of the active profile, either a switch or an edit of its record
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveProfileChange {
    /// The profile now in effect
    pub new_profile: Profile,
    /// The previous profile, when the batch carried it
    pub old_profile: Option<Profile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Profile {
        let options = json!({"waveform": true, "mode": {"holding": {"shift": false}}});
        Profile::new("p1", options.as_object().cloned().unwrap())
    }

    #[test]
    fn test_profile_serializes_flat() {
        let value = sample().to_value().unwrap();
        assert_eq!(value["id"], json!("p1"));
        assert_eq!(value["waveform"], json!(true));

        let back: Profile = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_get_and_set_dotted_path() {
        let mut profile = sample();
        assert_eq!(profile.get("mode.holding.shift"), Some(&json!(false)));
        assert_eq!(profile.get("mode.missing"), None);

        profile.set("mode.holding.shift", json!(true)).unwrap();
        profile.set("dicts.selected", json!(["bing"])).unwrap();

        assert_eq!(profile.get("mode.holding.shift"), Some(&json!(true)));
        assert_eq!(profile.get("dicts.selected"), Some(&json!(["bing"])));
    }

    #[test]
    fn test_set_rejects_bad_paths() {
        let mut profile = sample();
        assert!(profile.set("", json!(1)).is_err());
        assert!(profile.set("mode..x", json!(1)).is_err());
        assert!(profile.set("id", json!("other")).is_err());
        assert!(profile.set("waveform.nested", json!(1)).is_err());
        assert_eq!(profile.id, "p1");
    }

    #[test]
    fn test_display_name() {
        let placeholder = ProfileId::new("a", "%%_sentence_%%");
        assert_eq!(
            placeholder.display_name(|key| format!("t:{key}")),
            "t:sentence"
        );

        let plain = ProfileId::new("b", "My Profile");
        assert_eq!(plain.display_name(|_| unreachable!()), "My Profile");
        assert_eq!(ProfileId::new("c", "%%_bad key_%%").placeholder_key(), None);
    }
}

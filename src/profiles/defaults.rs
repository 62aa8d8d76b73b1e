//! Default profiles and the merge-with-defaults transform
//!
//! Stored records may have been written by an older (or newer) build with a
//! different set of fields. [`ProfileDefaults::merge_profile`] brings any raw
//! record up to the current shape before the rest of the crate looks at it.

use crate::config::ProfilesConfig;
use crate::profiles::types::{Profile, ProfileId, ProfilesStorage};
use log::debug;
use serde_json::{json, Map, Value};

/// Display name of generated profiles, resolved by the UI's translator
pub const DEFAULT_PROFILE_NAME: &str = "%%_default_%%";

/// Option fields shipped with the crate
pub fn builtin_profile_options() -> Value {
    json!({
        "mode": {
            "icon": true,
            "direct": false,
            "double": false,
            "holding": { "shift": false, "ctrl": false, "meta": false }
        },
        "stickyFold": false,
        "waveform": true,
        "dicts": {
            "selected": ["bing", "cambridge", "google"]
        }
    })
}

/// Generates default profiles and merges stored records with defaults
#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    options: Map<String, Value>,
    name: String,
}

impl ProfileDefaults {
    /// Build from a validated configuration
    pub fn from_config(config: &ProfilesConfig) -> Self {
        Self {
            options: config
                .profile_defaults
                .as_object()
                .cloned()
                .unwrap_or_default(),
            name: config.default_profile_name.clone(),
        }
    }

    /// A default profile, under `id` or a freshly generated one
    pub fn get_default_profile(&self, id: Option<&str>) -> Profile {
        let id = id.map_or_else(generate_profile_id, str::to_string);
        Profile::new(id, self.options.clone())
    }

    /// A default list entry, under `id` or a freshly generated one
    pub fn get_default_profile_id(&self, id: Option<&str>) -> ProfileId {
        let id = id.map_or_else(generate_profile_id, str::to_string);
        ProfileId::new(id, self.name.clone())
    }

    /// A brand-new layout with a single default profile
    pub fn gen_profiles_storage(&self) -> ProfilesStorage {
        let profile_id = self.get_default_profile_id(None);
        let profile = self.get_default_profile(Some(&profile_id.id));
        ProfilesStorage {
            profile_id_list: vec![profile_id],
            profiles: vec![profile],
        }
    }

    /// Merge a raw stored record with the current defaults
    ///
    /// Fields missing from `raw`, or stored with a different JSON type than the
    /// default, take the default value. Fields the defaults don't know about are
    /// kept so a record written by a newer build survives a round trip through an
    /// older one. The id comes from `raw` when it has a non-empty string id,
    /// otherwise from `fallback_id`.
    pub fn merge_profile(&self, raw: &Value, fallback_id: &str) -> Profile {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(fallback_id)
            .to_string();

        let mut options = self.options.clone();
        if let Some(raw_options) = raw.as_object() {
            merge_into(&mut options, raw_options);
        } else {
            debug!("Profile record '{id}' is not an object, using defaults");
        }
        options.remove("id");

        Profile::new(id, options)
    }
}

/// Fresh opaque profile id
pub fn generate_profile_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn merge_into(target: &mut Map<String, Value>, raw: &Map<String, Value>) {
    for (key, raw_value) in raw {
        match target.get_mut(key) {
            Some(default_value) => {
                if let Some(merged) = merge_value(default_value, raw_value) {
                    *default_value = merged;
                } else {
                    debug!("Ignoring stored '{key}': type differs from default");
                }
            }
            None => {
                target.insert(key.clone(), raw_value.clone());
            }
        }
    }
}

fn merge_value(default: &Value, raw: &Value) -> Option<Value> {
    match (default, raw) {
        (Value::Object(d), Value::Object(r)) => {
            let mut merged = d.clone();
            merge_into(&mut merged, r);
            Some(Value::Object(merged))
        }
        (Value::Null, _) => Some(raw.clone()),
        (Value::Bool(_), Value::Bool(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Array(_), Value::Array(_)) => Some(raw.clone()),
        _ => None,
    }
}

//! Configuration types for profile-sync

use crate::error::{Error, Result};
use crate::profiles::defaults::{builtin_profile_options, DEFAULT_PROFILE_NAME};
use serde_json::Value;

#[cfg(feature = "file-store")]
use crate::store::{StoreQuota, DEFAULT_CHANNEL_CAPACITY};
#[cfg(feature = "file-store")]
use std::path::PathBuf;

/// Configuration for the [`ProfileManager`](crate::ProfileManager)
#[derive(Debug, Clone)]
pub struct ProfilesConfig {
    /// Option fields every profile starts from (must be a JSON object)
    pub profile_defaults: Value,

    /// Display name given to generated profiles.
    /// Usually a `%%_<key>_%%` placeholder resolved by the UI.
    pub default_profile_name: String,

    /// Log consistency diagnostics (unlisted ids, duplicate entries, missing records)
    pub diagnostics: bool,

    /// Also delete legacy keys when resetting all profiles
    pub reset_removes_legacy: bool,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            profile_defaults: builtin_profile_options(),
            default_profile_name: DEFAULT_PROFILE_NAME.to_string(),
            diagnostics: cfg!(debug_assertions),
            reset_removes_legacy: false,
        }
    }
}

impl ProfilesConfig {
    /// Create a new builder for ProfilesConfig
    ///
    /// # Example
    /// ```rust
    /// use profile_sync::ProfilesConfig;
    /// use serde_json::json;
    ///
    /// let config = ProfilesConfig::builder()
    ///     .with_defaults(json!({"theme": "dark"}))
    ///     .diagnostics(true)
    ///     .build();
    /// assert!(config.diagnostics);
    /// ```
    pub fn builder() -> ProfilesConfigBuilder {
        ProfilesConfigBuilder::new()
    }

    /// Check the configuration for errors
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the defaults are not an object or contain an `id` field.
    pub fn validate(&self) -> Result<()> {
        let Some(defaults) = self.profile_defaults.as_object() else {
            return Err(Error::Config(
                "Profile defaults must be a JSON object".into(),
            ));
        };
        if defaults.contains_key("id") {
            return Err(Error::Config(
                "Profile defaults must not contain an 'id' field".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for creating ProfilesConfig with a fluent API
#[derive(Debug, Clone, Default)]
pub struct ProfilesConfigBuilder {
    config: ProfilesConfig,
}

impl ProfilesConfigBuilder {
    /// Create a new builder with the built-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the option fields new profiles start from
    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.config.profile_defaults = defaults;
        self
    }

    /// Set the display name of generated profiles
    pub fn default_profile_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_profile_name = name.into();
        self
    }

    /// Enable or disable consistency diagnostics
    ///
    /// Defaults to on in debug builds and off in release builds.
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.config.diagnostics = enabled;
        self
    }

    /// Remove legacy `configProfileIDs`/`activeConfigID` data on reset
    pub fn reset_removes_legacy(mut self, enabled: bool) -> Self {
        self.config.reset_removes_legacy = enabled;
        self
    }

    /// Build the ProfilesConfig
    pub fn build(self) -> ProfilesConfig {
        self.config
    }
}

// =============================================================================
// File Store Configuration
// =============================================================================

/// Configuration for [`JsonFileStore`](crate::store::JsonFileStore)
#[cfg(feature = "file-store")]
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Directory holding the store file
    pub config_dir: PathBuf,

    /// Store filename (e.g., "storage.json")
    pub file_name: String,

    /// Pretty print JSON output
    pub pretty_json: bool,

    /// Size limits
    pub quota: StoreQuota,

    /// Capacity of the change broadcast channel
    pub channel_capacity: usize,
}

#[cfg(feature = "file-store")]
impl FileStoreConfig {
    /// Create a new builder for FileStoreConfig
    ///
    /// # Example
    /// ```rust
    /// use profile_sync::FileStoreConfig;
    ///
    /// let config = FileStoreConfig::builder("my-extension")
    ///     .config_dir("/tmp/my-extension")
    ///     .build();
    /// assert!(config.store_path().ends_with("storage.json"));
    /// ```
    pub fn builder(app_name: impl Into<String>) -> FileStoreConfigBuilder {
        FileStoreConfigBuilder::new(app_name)
    }

    /// Get the full path to the store file
    pub fn store_path(&self) -> PathBuf {
        self.config_dir.join(&self.file_name)
    }
}

/// Builder for creating FileStoreConfig with a fluent API
#[cfg(feature = "file-store")]
#[derive(Debug, Clone)]
pub struct FileStoreConfigBuilder {
    app_name: String,
    config_dir: Option<PathBuf>,
    file_name: String,
    pretty_json: bool,
    quota: StoreQuota,
    channel_capacity: usize,
}

#[cfg(feature = "file-store")]
impl FileStoreConfigBuilder {
    /// Create a new builder for the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            config_dir: None,
            file_name: "storage.json".into(),
            pretty_json: true,
            quota: StoreQuota::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the configuration directory
    ///
    /// Supports `~` expansion for home directory.
    pub fn config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let expanded = match (path.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => path,
        };
        self.config_dir = Some(expanded);
        self
    }

    /// Set the store filename (default: "storage.json")
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Use compact JSON (no pretty printing)
    pub fn compact_json(mut self) -> Self {
        self.pretty_json = false;
        self
    }

    /// Set the size limits
    pub fn quota(mut self, quota: StoreQuota) -> Self {
        self.quota = quota;
        self
    }

    /// Set the change channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build the FileStoreConfig
    ///
    /// If `config_dir` is not set, uses the system config directory for the app.
    pub fn build(self) -> FileStoreConfig {
        let config_dir = self.config_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .map(|d| d.join(&self.app_name))
                .unwrap_or_else(|| PathBuf::from("."))
        });

        FileStoreConfig {
            config_dir,
            file_name: self.file_name,
            pretty_json: self.pretty_json,
            quota: self.quota,
            channel_capacity: self.channel_capacity,
        }
    }
}

//! # profile-sync
//!
//! Named configuration profiles persisted in a synced key-value store, with an
//! active profile pointer and change notifications for UI consumers.
//!
//! ## Features
//!
//! - **Sharded storage**: the profile catalog, the active id and every profile
//!   record live under separate keys, so no single write exceeds per-item quotas
//! - **Legacy migration**: the older `configProfileIDs` layout is converted on
//!   first run by [`ProfileManager::init_profiles`]
//! - **Defaults merging**: stored records are merged with the current defaults,
//!   so fields added in later builds show up with their default values
//! - **Change streams**: read-then-subscribe streams of the profile list and the
//!   active profile, plus raw listener callbacks
//! - **Pluggable stores**: anything implementing [`KeyValueStore`]; an in-memory
//!   store and a JSON file store (`file-store` feature) are included
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use profile_sync::{MemoryStore, ProfileId, ProfileManager};
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! # async fn example() -> profile_sync::Result<()> {
//! let manager = ProfileManager::builder(MemoryStore::new())
//!     .with_defaults(json!({"theme": "dark", "fontSize": 14}))
//!     .build()?;
//!
//! // Migrate or bootstrap storage, returns the active profile
//! let active = manager.init_profiles().await?;
//!
//! // Follow the active profile across switches and edits
//! let mut profiles = manager.active_profile_stream();
//! assert_eq!(profiles.next().await.transpose()?.map(|p| p.id), Some(active.id));
//!
//! manager.add_profile(ProfileId::new("work", "Work")).await?;
//! manager.update_active_profile_id("work").await?;
//! manager.set_profile_field("work", "fontSize", json!(16)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Listeners
//!
//! ```rust,no_run
//! use profile_sync::{MemoryStore, ProfileManager};
//!
//! # async fn example() -> profile_sync::Result<()> {
//! let manager = ProfileManager::builder(MemoryStore::new()).build()?;
//!
//! // Delivery stops when the handle is dropped
//! let _handle = manager.add_active_profile_listener(|change| {
//!     println!("Now using profile {}", change.new_profile.id);
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Diagnostics
//!
//! Inconsistencies that are recovered from (a listed profile without a record,
//! activating an unlisted id, ...) are logged as warnings under the
//! `profile_sync::diagnostics` target when [`ProfilesConfig::diagnostics`] is set.
//! It defaults to on in debug builds.

// Core modules
mod error;
mod events;
mod streams;

// Grouped modules
pub mod config;
pub mod profiles;
pub mod store;

// Re-exports from core
pub use error::{Error, Result};
pub use events::{classify, ListenerHandle, ProfileEvent};
pub use streams::ProfileStream;

// Re-exports from config
pub use config::{ProfilesConfig, ProfilesConfigBuilder};

#[cfg(feature = "file-store")]
pub use config::{FileStoreConfig, FileStoreConfigBuilder};

// Re-exports from store
pub use store::{KeyValueStore, MemoryStore, StorageChange, StorageChanges, StoreQuota};

#[cfg(feature = "file-store")]
pub use store::JsonFileStore;

// Re-exports from profiles
pub use profiles::{
    ActiveProfileChange, MigrationOutcome, Profile, ProfileDefaults, ProfileId, ProfileManager,
    ProfileManagerBuilder, ProfilesStorage, ValueChange, DEFAULT_PROFILE_NAME,
};

// =============================================================================
// Convenient Type Aliases
// =============================================================================

/// Profile manager over an in-memory store
///
/// Clones of a [`MemoryStore`] share their data, which makes this handy for
/// tests that simulate several contexts writing to one synced area.
pub type MemoryProfileManager = ProfileManager<MemoryStore>;

/// Profile manager persisting to a JSON file
///
/// # Example
/// ```no_run
/// use profile_sync::{FileProfileManager, FileStoreConfig, JsonFileStore};
///
/// let store = JsonFileStore::open(&FileStoreConfig::builder("my-extension").build())?;
/// let manager = FileProfileManager::builder(store).build()?;
/// # Ok::<(), profile_sync::Error>(())
/// ```
#[cfg(feature = "file-store")]
pub type FileProfileManager = ProfileManager<JsonFileStore>;

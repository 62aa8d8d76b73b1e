//! Profile management for profile-sync
//!
//! Multiple named configurations ("profiles") live in a synced key-value store,
//! with exactly one of them active at a time.
//!
//! # Storage layout
//!
//! Synced areas cap the size of a single item, so profiles are sharded: every
//! profile record is stored under its own key.
//!
//! | Key | Value |
//! |-----|-------|
//! | `profileIDList` | ordered `[{id, name}]` catalog |
//! | `activeProfileID` | id of the active profile |
//! | `<id>` | full profile record, one key per profile |
//!
//! Older builds kept a single list of ids under `configProfileIDs` and the active
//! one under `activeConfigID`. [`ProfileManager::init_profiles`] migrates that
//! layout on first run and leaves the legacy keys untouched.
//!
//! # Invariants
//!
//! After [`init_profiles`](ProfileManager::init_profiles):
//! - the list is non-empty,
//! - the active id is one of the listed ids,
//! - every listed id has a record.
//!
//! Later read-modify-write operations are not atomic against writers in other
//! contexts. The store's change notifications are the only reconciliation path.
//!
//! # Example
//!
//! ```rust
//! use profile_sync::{MemoryStore, ProfileId, ProfileManager};
//!
//! # async fn example() -> profile_sync::Result<()> {
//! let manager = ProfileManager::builder(MemoryStore::new()).build()?;
//! let active = manager.init_profiles().await?;
//!
//! manager.add_profile(ProfileId::new("work", "Work")).await?;
//! manager.update_active_profile_id("work").await?;
//! assert_eq!(manager.get_active_profile().await?.id, "work");
//!
//! manager.remove_profile("work").await?;
//! assert_eq!(manager.get_active_profile_id().await?, active.id);
//! # Ok(())
//! # }
//! ```

pub(crate) mod defaults;
pub(crate) mod manager;
mod migrator;
mod types;

pub use defaults::{ProfileDefaults, DEFAULT_PROFILE_NAME, builtin_profile_options, generate_profile_id};
pub use manager::{ProfileManager, ProfileManagerBuilder};
pub use migrator::MigrationOutcome;
pub use types::{ActiveProfileChange, Profile, ProfileId, ProfilesStorage, ValueChange};

/// Key of the ordered profile catalog
pub const PROFILE_ID_LIST_KEY: &str = "profileIDList";

/// Key of the active profile id
pub const ACTIVE_PROFILE_ID_KEY: &str = "activeProfileID";

/// Legacy key of the profile id list
pub const LEGACY_ID_LIST_KEY: &str = "configProfileIDs";

/// Legacy key of the active profile id
pub const LEGACY_ACTIVE_ID_KEY: &str = "activeConfigID";

/// Log target for consistency diagnostics
pub const DIAGNOSTICS_TARGET: &str = "profile_sync::diagnostics";

/// Check whether a key is reserved for bookkeeping rather than a profile record
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    matches!(
        key,
        PROFILE_ID_LIST_KEY | ACTIVE_PROFILE_ID_KEY | LEGACY_ID_LIST_KEY | LEGACY_ACTIVE_ID_KEY
    )
}

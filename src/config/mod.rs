//! Configuration types
//!
//! - `ProfilesConfig` - Profile defaults, diagnostics and reset behavior
//! - `FileStoreConfig` - Location and limits of the JSON file store

mod types;

pub use types::{ProfilesConfig, ProfilesConfigBuilder};

#[cfg(feature = "file-store")]
pub use types::{FileStoreConfig, FileStoreConfigBuilder};

//! Error types for profile-sync

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for profile-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for profile-sync
#[derive(Error, Debug)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    /// A [`KeyValueStore`](crate::KeyValueStore) backend failed to read
    ///
    /// The bundled stores never fail this way; external backends report their
    /// transport errors with it.
    #[error("Failed to read from {area} store: {reason}")]
    StoreRead { area: String, reason: String },

    /// A [`KeyValueStore`](crate::KeyValueStore) backend failed to write
    #[error("Failed to write to {area} store: {reason}")]
    StoreWrite { area: String, reason: String },

    #[error("Quota exceeded for '{key}': {size} bytes exceeds the {limit} byte limit")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Store item limit exceeded: {count} items exceeds the limit of {limit}")]
    TooManyItems { count: usize, limit: usize },

    // -------------------------------------------------------------------------
    // File Store Errors (file-store feature)
    // -------------------------------------------------------------------------
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to parse stored value for '{key}': {reason}")]
    Parse { key: String, reason: String },

    // -------------------------------------------------------------------------
    // Profile Errors
    // -------------------------------------------------------------------------
    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("Profile '{0}' already exists")]
    ProfileAlreadyExists(String),

    #[error("Cannot remove the last remaining profile '{0}'")]
    CannotRemoveLastProfile(String),

    #[error("Invalid profile field path: {0}")]
    InvalidFieldPath(String),

    #[error("Profile id '{0}' is reserved for bookkeeping")]
    ReservedProfileId(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a "not found" type error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ProfileNotFound(_))
    }

    /// Check if this error was caused by a store quota
    #[must_use]
    pub fn is_quota_error(&self) -> bool {
        matches!(
            self,
            Error::QuotaExceeded { .. } | Error::TooManyItems { .. }
        )
    }

    pub(crate) fn parse(key: &str, err: impl std::fmt::Display) -> Self {
        Error::Parse {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

//! Error types for user record storage.

use std::path::PathBuf;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of the backing user file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing file is missing or could not be read.
    #[error("user store {} is unavailable: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not a JSON array of user records.
    #[error("user store {} could not be parsed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The updated collection could not be written back.
    #[error("failed to write user store {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// True for failures that mean the collection could not be loaded at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Malformed { .. })
    }
}

//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (file not found, disk error, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid key format
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The host refused a write because the storage quota is exhausted.
    #[error("Storage full: cannot write {key} ({needed} bytes needed, {quota} byte quota)")]
    Full {
        key: String,
        needed: usize,
        quota: usize,
    },

    /// The host denied access to the storage area altogether.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// The change watcher could not be installed.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl StorageError {
    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Map an IO error, singling out permission failures as [`StorageError::Unavailable`].
    pub fn from_io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::Unavailable(format!("{context}: {err}"))
        } else {
            Self::Io(err)
        }
    }
}

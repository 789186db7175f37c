//! Snapshot error types.

use stockpile_storage::StorageError;
use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Stored bytes under a version key are not a valid snapshot.
    #[error("Malformed snapshot {key}: {reason}")]
    MalformedSnapshot { key: String, reason: String },

    /// Item name is empty or blank.
    #[error("Item name must not be empty")]
    EmptyName,

    /// Another item already uses the requested name.
    #[error("An item named {0:?} already exists")]
    DuplicateName(String),

    /// Bulk item data does not match the item schema.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Version not found.
    #[error("Version not found: {0}")]
    NotFound(String),

    /// Storage error, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(String),
}

impl SnapshotError {
    /// Create a malformed snapshot error.
    pub fn malformed(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedSnapshot {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a schema violation error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaViolation(message.into())
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Whether this error is a rejected user input that committed nothing.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyName | Self::DuplicateName(_) | Self::SchemaViolation(_)
        )
    }
}

//! Storage layer for stockpile.
//!
//! This crate provides a flat string key/value abstraction with two backends:
//! - File storage, one file per key (default)
//! - In-memory storage shared between execution contexts (for testing and embedding)
//!
//! Reads and writes are synchronous: they complete or fail immediately.
//! Observing writes made by *other* users of the same storage is a separate
//! capability, [`ChangeFeed`].

pub mod error;
pub mod file;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;

use std::any::Any;
use std::sync::Arc;

/// Iterator over the keys present in a store.
///
/// Calling [`KeyValueStore::keys`] again starts a fresh pass.
pub type Keys<'a> = Box<dyn Iterator<Item = String> + 'a>;

/// A key/value storage backend.
///
/// Keys and values are plain strings. The backend may be shared with other
/// execution contexts, so callers must not cache what they read.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// List the keys currently present.
    fn keys(&self) -> StorageResult<Keys<'_>>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn keys(&self) -> StorageResult<Keys<'_>> {
        (**self).keys()
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn keys(&self) -> StorageResult<Keys<'_>> {
        (**self).keys()
    }
}

/// A write observed by a [`ChangeFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The key that changed.
    pub key: String,
    /// The value after the change, `None` if the key disappeared.
    pub new_value: Option<String>,
}

/// Callback invoked for each foreign write.
pub type ChangeListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Keeps a listener registered; dropping it detaches the listener.
#[must_use = "dropping the guard stops change delivery"]
pub struct WatchGuard {
    _inner: Box<dyn Any + Send>,
}

impl WatchGuard {
    pub(crate) fn new<T: Any + Send>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard").finish_non_exhaustive()
    }
}

/// A backend that can report writes made outside the local execution context.
///
/// Writes performed through the same handle are never reported.
pub trait ChangeFeed {
    /// Register a listener for foreign writes.
    fn watch(&self, listener: ChangeListener) -> StorageResult<WatchGuard>;
}

//! In-memory storage shared between execution contexts.
//!
//! A [`MemoryStore`] is one execution context over a shared map. Sibling
//! handles created with [`MemoryStore::open_context`] see the same data, and
//! each one is told about the writes of the others through [`ChangeFeed`],
//! the way browser tabs observe each other's local storage.

use crate::{
    ChangeFeed, ChangeListener, KeyValueStore, Keys, StorageError, StorageEvent, StorageResult,
    WatchGuard,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::trace;

struct Registration {
    id: u64,
    context: u64,
    listener: ChangeListener,
}

struct Shared {
    data: RwLock<HashMap<String, String>>,
    listeners: RwLock<Vec<Registration>>,
    next_context: AtomicU64,
    next_listener: AtomicU64,
    quota: Option<usize>,
}

impl Shared {
    fn dispatch(&self, origin: u64, event: &StorageEvent) -> StorageResult<()> {
        let targets: Vec<ChangeListener> = self
            .listeners
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?
            .iter()
            .filter(|r| r.context != origin)
            .map(|r| r.listener.clone())
            .collect();

        // Listeners run outside the lock so they may read the store.
        for listener in targets {
            listener(event);
        }
        Ok(())
    }
}

/// Unregisters a listener when the [`WatchGuard`] holding it is dropped.
struct Detach {
    shared: Weak<Shared>,
    id: u64,
}

impl Drop for Detach {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            if let Ok(mut listeners) = shared.listeners.write() {
                listeners.retain(|r| r.id != self.id);
            }
        }
    }
}

/// In-memory storage.
///
/// This stores all data in memory and is not persistent.
pub struct MemoryStore {
    shared: Arc<Shared>,
    context: u64,
}

impl MemoryStore {
    /// Create a new, empty in-memory storage with no quota.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a new, empty in-memory storage that refuses writes once the
    /// total size of keys and values would exceed `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self::build(Some(quota))
    }

    fn build(quota: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                next_context: AtomicU64::new(1),
                next_listener: AtomicU64::new(0),
                quota,
            }),
            context: 0,
        }
    }

    /// Open another execution context over the same data.
    pub fn open_context(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            context: self.shared.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Identifier of this handle's execution context.
    pub fn context_id(&self) -> u64 {
        self.context
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self
            .shared
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::invalid_key("Key cannot be empty"));
        }

        {
            let mut data = self
                .shared
                .data
                .write()
                .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

            if let Some(quota) = self.shared.quota {
                let others: usize = data
                    .iter()
                    .filter(|(k, _)| k.as_str() != key)
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                let needed = others + key.len() + value.len();
                if needed > quota {
                    return Err(StorageError::Full {
                        key: key.to_string(),
                        needed,
                        quota,
                    });
                }
            }

            data.insert(key.to_string(), value.to_string());
        }

        trace!(context = self.context, key, "memory write");
        self.shared.dispatch(
            self.context,
            &StorageEvent {
                key: key.to_string(),
                new_value: Some(value.to_string()),
            },
        )
    }

    fn keys(&self) -> StorageResult<Keys<'_>> {
        let data = self
            .shared
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        let keys: Vec<String> = data.keys().cloned().collect();
        Ok(Box::new(keys.into_iter()))
    }
}

impl ChangeFeed for MemoryStore {
    fn watch(&self, listener: ChangeListener) -> StorageResult<WatchGuard> {
        let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
        self.shared
            .listeners
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?
            .push(Registration {
                id,
                context: self.context,
                listener,
            });
        Ok(WatchGuard::new(Detach {
            shared: Arc::downgrade(&self.shared),
            id,
        }))
    }
}

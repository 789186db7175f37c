//! Change notification for writes made by other execution contexts.
//!
//! The notifier attaches to a backend's [`ChangeFeed`], keeps only events for
//! keys of the snapshot layout, and fans them out to subscribers. It never
//! reads the store itself; subscribers re-resolve when told to.

use crate::hash::VersionHash;
use crate::store::{parse_version_key, CURRENT_KEY};
use crate::SnapshotResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use stockpile_storage::{ChangeFeed, StorageEvent, WatchGuard};
use tracing::{debug, trace};

/// What an external write touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// The current pointer moved.
    CurrentPointer,
    /// A snapshot was stored.
    Version(VersionHash),
}

/// A write to the snapshot layout made outside this execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    pub key: String,
    pub kind: ChangeKind,
}

impl ExternalChange {
    /// Classify a storage event. Keys outside the snapshot layout yield `None`.
    pub fn classify(event: &StorageEvent) -> Option<Self> {
        let kind = if event.key == CURRENT_KEY {
            ChangeKind::CurrentPointer
        } else {
            ChangeKind::Version(parse_version_key(&event.key)?)
        };
        Some(Self {
            key: event.key.clone(),
            kind,
        })
    }
}

type Callback = Arc<dyn Fn(&ExternalChange) + Send + Sync>;

struct Inner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Callback>>,
    feed: Mutex<Option<WatchGuard>>,
}

impl Inner {
    fn dispatch(&self, event: &StorageEvent) {
        let Some(change) = ExternalChange::classify(event) else {
            trace!(key = %event.key, "Ignoring change outside snapshot layout");
            return;
        };

        let callbacks: Vec<Callback> = match self.subscribers.lock() {
            Ok(subscribers) => subscribers.values().cloned().collect(),
            Err(_) => return,
        };
        debug!(key = %change.key, subscribers = callbacks.len(), "External change");

        // Callbacks run unlocked so they may subscribe or unsubscribe.
        for callback in callbacks {
            callback(&change);
        }
    }
}

/// Fans out external changes to subscribers.
///
/// Cloning yields another handle to the same subscriber set.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

impl ChangeNotifier {
    /// Create a notifier not yet attached to any backend.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
                feed: Mutex::new(None),
            }),
        }
    }

    /// Create a notifier attached to `feed`.
    pub fn watching(feed: &(impl ChangeFeed + ?Sized)) -> SnapshotResult<Self> {
        let notifier = Self::new();
        notifier.attach(feed)?;
        Ok(notifier)
    }

    /// Start receiving events from `feed`, replacing any earlier attachment.
    pub fn attach(&self, feed: &(impl ChangeFeed + ?Sized)) -> SnapshotResult<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let guard = feed.watch(Arc::new(move |event: &StorageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(event);
            }
        }))?;

        if let Ok(mut slot) = self.inner.feed.lock() {
            *slot = Some(guard);
        }
        Ok(())
    }

    /// Stop receiving events from the attached feed.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.inner.feed.lock() {
            slot.take();
        }
    }

    /// Register a callback for external changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ExternalChange) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.insert(id, Arc::new(callback));
        }
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver an event as if it came from the attached feed.
    pub fn dispatch(&self, event: &StorageEvent) {
        self.inner.dispatch(event);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// A registered callback. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Weak<Inner>,
    id: u64,
}

impl Subscription {
    /// Stop receiving changes.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut subscribers) = inner.subscribers.lock() {
                subscribers.remove(&self.id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpile_storage::{KeyValueStore, MemoryStore};

    fn event(key: &str) -> StorageEvent {
        StorageEvent {
            key: key.to_string(),
            new_value: Some("x".to_string()),
        }
    }

    fn recorder(notifier: &ChangeNotifier) -> (Subscription, Arc<Mutex<Vec<ExternalChange>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = notifier.subscribe(move |change| sink.lock().unwrap().push(change.clone()));
        (subscription, seen)
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ExternalChange::classify(&event("current-sha")).map(|c| c.kind),
            Some(ChangeKind::CurrentPointer)
        );
        assert_eq!(
            ExternalChange::classify(&event("data-version-abc")).map(|c| c.kind),
            Some(ChangeKind::Version(VersionHash::from_string("abc")))
        );
        assert_eq!(ExternalChange::classify(&event("theme")), None);
        assert_eq!(ExternalChange::classify(&event("data-version-")), None);
    }

    #[test]
    fn test_dispatch_filters_foreign_keys() {
        let notifier = ChangeNotifier::new();
        let (_subscription, seen) = recorder(&notifier);

        notifier.dispatch(&event("settings"));
        notifier.dispatch(&event("current-sha"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ChangeKind::CurrentPointer);
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let notifier = ChangeNotifier::new();
        let (first, seen_first) = recorder(&notifier);
        let (second, seen_second) = recorder(&notifier);
        assert_eq!(notifier.subscriber_count(), 2);

        first.unsubscribe();
        notifier.dispatch(&event("current-sha"));
        drop(second);
        notifier.dispatch(&event("current-sha"));

        assert_eq!(notifier.subscriber_count(), 0);
        assert!(seen_first.lock().unwrap().is_empty());
        assert_eq!(seen_second.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_only_other_contexts_notify() {
        let local = MemoryStore::new();
        let remote = local.open_context();
        let notifier = ChangeNotifier::watching(&local).unwrap();
        let (_subscription, seen) = recorder(&notifier);

        local.set("current-sha", "mine").unwrap();
        assert!(seen.lock().unwrap().is_empty());

        remote.set("data-version-abc", "{}").unwrap();
        remote.set("current-sha", "abc").unwrap();
        remote.set("unrelated", "1").unwrap();

        let kinds: Vec<ChangeKind> = seen.lock().unwrap().iter().map(|c| c.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Version(VersionHash::from_string("abc")),
                ChangeKind::CurrentPointer,
            ]
        );
    }

    #[test]
    fn test_detach_stops_delivery() {
        let local = MemoryStore::new();
        let remote = local.open_context();
        let notifier = ChangeNotifier::watching(&local).unwrap();
        let (_subscription, seen) = recorder(&notifier);

        notifier.detach();
        remote.set("current-sha", "abc").unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }
}

//! The inventory: reading and editing the current snapshot.
//!
//! Every mutation follows the same steps:
//! resolve the current snapshot, build a fresh item map from it, commit a new
//! snapshot whose parent is the resolved one, then advance the current pointer.
//! Nothing spans those steps, so a concurrent writer in another execution
//! context may have its pointer move overwritten. Its snapshot stays stored.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::hash::VersionHash;
use crate::import::{items_from_json, items_from_value, items_to_json};
use crate::resolver::{RepairPolicy, Resolved, Resolver};
use crate::store::{VersionEntry, VersionStore};
use crate::verify::{verify_store, VerifyReport};
use crate::{ItemDraft, Items, Snapshot, SnapshotError, SnapshotResult};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use stockpile_storage::KeyValueStore;
use tracing::{info, warn};

/// A committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Digest of the new snapshot, now current.
    pub hash: VersionHash,
    /// Digest of the snapshot it was derived from.
    pub parent: VersionHash,
    pub snapshot: Snapshot,
}

/// Versioned inventory over a key/value store.
pub struct Inventory<S> {
    versions: VersionStore<S>,
    clock: Arc<dyn Clock>,
    repair: RepairPolicy,
}

impl<S: KeyValueStore> Inventory<S> {
    /// Create an inventory using the wall clock and the default repair policy.
    pub fn new(store: S) -> Self {
        Self {
            versions: VersionStore::new(store),
            clock: Arc::new(SystemClock),
            repair: RepairPolicy::default(),
        }
    }

    /// Create an inventory configured by `config`.
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store).with_repair_policy(config.repair_policy())
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different repair policy.
    pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
        self.repair = policy;
        self
    }

    /// The snapshot store.
    pub fn versions(&self) -> &VersionStore<S> {
        &self.versions
    }

    /// The active repair policy.
    pub fn repair_policy(&self) -> RepairPolicy {
        self.repair
    }

    /// Resolve the current snapshot, repairing or seeding the store as needed.
    pub fn resolve_current(&self) -> SnapshotResult<Resolved> {
        Resolver::new(&self.versions, self.clock.as_ref(), self.repair).resolve()
    }

    /// Items of the current snapshot.
    pub fn current_items(&self) -> SnapshotResult<Items> {
        Ok(self.resolve_current()?.snapshot.into_items())
    }

    /// Every readable snapshot, newest first.
    pub fn list_all_versions(&self) -> SnapshotResult<Vec<VersionEntry>> {
        self.versions.list()
    }

    /// Look up a snapshot by digest.
    pub fn get_version(&self, hash: &VersionHash) -> SnapshotResult<Snapshot> {
        self.versions.require(hash)
    }

    /// The ancestry of the current snapshot, newest first.
    ///
    /// The walk ends at a root, at a parent that is missing or unreadable,
    /// or at a digest already visited.
    pub fn history(&self) -> SnapshotResult<Vec<VersionEntry>> {
        let current = self.resolve_current()?;
        let mut seen = HashSet::from([current.hash.clone()]);
        let mut next = current.snapshot.previous_version().cloned();
        let mut chain = vec![VersionEntry {
            hash: current.hash,
            snapshot: current.snapshot,
        }];

        while let Some(hash) = next.take() {
            if !seen.insert(hash.clone()) {
                warn!(hash = %hash, "History loops back on itself");
                break;
            }
            let snapshot = match self.versions.load(&hash) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    warn!(hash = %hash, "History ends at a missing snapshot");
                    break;
                }
                Err(SnapshotError::MalformedSnapshot { reason, .. }) => {
                    warn!(hash = %hash, reason = %reason, "History ends at an unreadable snapshot");
                    break;
                }
                Err(e) => return Err(e),
            };
            next = snapshot.previous_version().cloned();
            chain.push(VersionEntry { hash, snapshot });
        }

        Ok(chain)
    }

    /// Insert, update or rename an item.
    ///
    /// With `old_name` set to a different name, the item under `old_name` is
    /// removed and `draft` is stored under `new_name`. `new_name` must not be
    /// blank and must not name another existing item.
    ///
    /// A name of only whitespace counts as blank and fails with [`SnapshotError::EmptyName`].
    pub fn upsert_item(
        &self,
        old_name: Option<&str>,
        new_name: &str,
        draft: ItemDraft,
    ) -> SnapshotResult<Commit> {
        if new_name.trim().is_empty() {
            return Err(SnapshotError::EmptyName);
        }

        let current = self.resolve_current()?;
        let renaming_to_self = old_name == Some(new_name);
        if !renaming_to_self && current.snapshot.item(new_name).is_some() {
            return Err(SnapshotError::DuplicateName(new_name.to_string()));
        }

        let mut items = current.snapshot.items().clone();
        if let Some(old) = old_name.filter(|old| *old != new_name) {
            items.remove(old);
        }
        items.insert(new_name.to_string(), draft.into_item());

        self.commit_items(current.hash, items, "upsert")
    }

    /// Remove an item. Removing an absent item still commits a snapshot.
    pub fn delete_item(&self, name: &str) -> SnapshotResult<Commit> {
        let current = self.resolve_current()?;
        let mut items = current.snapshot.items().clone();
        items.remove(name);
        self.commit_items(current.hash, items, "delete")
    }

    /// Replace every item with externally supplied data.
    ///
    /// The data is validated before anything is read or written.
    pub fn replace_all(&self, value: &Value) -> SnapshotResult<Commit> {
        let items = items_from_value(value)?;
        self.replace_items(items)
    }

    /// Replace every item with an already validated item map.
    pub fn replace_items(&self, items: Items) -> SnapshotResult<Commit> {
        let current = self.resolve_current()?;
        self.commit_items(current.hash, items, "replace")
    }

    /// Replace every item with JSON text in the import shape.
    pub fn import_json(&self, text: &str) -> SnapshotResult<Commit> {
        let items = items_from_json(text)?;
        self.replace_items(items)
    }

    /// Render the current items in the import shape.
    pub fn export_json(&self) -> SnapshotResult<String> {
        items_to_json(&self.current_items()?)
    }

    /// Commit a copy of an earlier snapshot's items on top of the current one.
    pub fn restore_to(&self, hash: &VersionHash) -> SnapshotResult<Commit> {
        let target = self.versions.require(hash)?;
        let current = self.resolve_current()?;
        info!(restored = %hash, "Restoring items");
        self.commit_items(current.hash, target.into_items(), "restore")
    }

    /// Check the integrity of every stored snapshot.
    pub fn verify(&self) -> SnapshotResult<VerifyReport> {
        verify_store(&self.versions)
    }

    fn commit_items(
        &self,
        parent: VersionHash,
        items: Items,
        operation: &'static str,
    ) -> SnapshotResult<Commit> {
        let snapshot = Snapshot::new(items, Some(parent.clone()), self.clock.now());
        let hash = self.versions.commit(&snapshot)?;
        self.versions.set_current_pointer(&hash)?;
        info!(
            operation,
            hash = %hash,
            parent = %parent,
            items = snapshot.items().len(),
            "Committed snapshot"
        );
        Ok(Commit {
            hash,
            parent,
            snapshot,
        })
    }
}

impl<S> std::fmt::Debug for Inventory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("repair", &self.repair)
            .finish_non_exhaustive()
    }
}

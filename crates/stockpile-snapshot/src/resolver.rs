//! Deciding which snapshot is current.
//!
//! Resolution runs before every operation that needs the current snapshot
//! and leaves the store with a pointer naming a readable snapshot:
//!
//! - a pointer naming a readable snapshot is used as-is;
//! - a missing, blank, dangling or unreadable pointer is repaired by picking
//!   one of the readable snapshots according to the [`RepairPolicy`];
//! - a store without any readable snapshot is seeded with a fixed example
//!   inventory, after which resolution runs exactly once more.

use crate::clock::Clock;
use crate::hash::VersionHash;
use crate::store::{VersionEntry, VersionStore};
use crate::{Item, Items, Snapshot, SnapshotError, SnapshotResult};
use serde::{Deserialize, Serialize};
use stockpile_storage::{KeyValueStore, StorageError};
use tracing::{debug, info, warn};

/// How a replacement current snapshot is chosen during repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairPolicy {
    /// The snapshot with the earliest timestamp.
    #[default]
    Earliest,
    /// The snapshot with the latest timestamp.
    Latest,
}

impl RepairPolicy {
    /// Pick the replacement among `candidates`. Equal timestamps go to the smaller digest.
    pub fn select(self, candidates: Vec<VersionEntry>) -> Option<VersionEntry> {
        let candidates = candidates.into_iter();
        match self {
            RepairPolicy::Earliest => candidates.min_by(|a, b| {
                a.snapshot
                    .timestamp()
                    .cmp(&b.snapshot.timestamp())
                    .then_with(|| a.hash.cmp(&b.hash))
            }),
            RepairPolicy::Latest => candidates.max_by(|a, b| {
                a.snapshot
                    .timestamp()
                    .cmp(&b.snapshot.timestamp())
                    .then_with(|| b.hash.cmp(&a.hash))
            }),
        }
    }
}

/// How the current snapshot was arrived at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The pointer was valid.
    Current,
    /// The pointer was absent or unusable and has been moved.
    Repaired {
        /// What the pointer held before, if anything.
        dangling: Option<VersionHash>,
    },
    /// The store was empty and has been seeded.
    Seeded,
}

/// The current snapshot and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub hash: VersionHash,
    pub snapshot: Snapshot,
    pub outcome: ResolveOutcome,
}

/// The inventory a fresh store starts with.
pub fn seed_items() -> Items {
    let mut items = Items::new();
    items.insert(
        "Example Item".to_string(),
        Item::new(2, ["example tag", "another example tag"]),
    );
    items.insert("Example Item #2".to_string(), Item::new(20, ["example tag"]));
    items
}

/// Bootstrap and repair of the current pointer.
pub struct Resolver<'a, S> {
    versions: &'a VersionStore<S>,
    clock: &'a dyn Clock,
    policy: RepairPolicy,
}

impl<'a, S: KeyValueStore> Resolver<'a, S> {
    pub fn new(versions: &'a VersionStore<S>, clock: &'a dyn Clock, policy: RepairPolicy) -> Self {
        Self {
            versions,
            clock,
            policy,
        }
    }

    /// Resolve the current snapshot, repairing or seeding the store as needed.
    ///
    /// Fails only when storage fails.
    pub fn resolve(&self) -> SnapshotResult<Resolved> {
        let mut seeded = false;

        // At most one seeding pass: the second iteration sees the seed.
        for _ in 0..2 {
            let pointer = self.versions.current_pointer()?;

            if let Some(hash) = &pointer {
                match self.versions.load(hash) {
                    Ok(Some(snapshot)) => {
                        debug!(hash = %hash, "Current snapshot resolved");
                        let outcome = if seeded {
                            ResolveOutcome::Seeded
                        } else {
                            ResolveOutcome::Current
                        };
                        return Ok(Resolved {
                            hash: hash.clone(),
                            snapshot,
                            outcome,
                        });
                    }
                    Ok(None) => warn!(hash = %hash, "Current pointer names a missing snapshot"),
                    Err(SnapshotError::MalformedSnapshot { reason, .. }) => {
                        warn!(hash = %hash, reason = %reason, "Current pointer names an unreadable snapshot")
                    }
                    Err(e) => return Err(e),
                }
            }

            let candidates = self.versions.scan()?.entries;
            if let Some(entry) = self.policy.select(candidates) {
                info!(
                    hash = %entry.hash,
                    dangling = ?pointer.as_ref().map(VersionHash::as_str),
                    policy = ?self.policy,
                    "Repaired current pointer"
                );
                self.versions.set_current_pointer(&entry.hash)?;
                return Ok(Resolved {
                    hash: entry.hash,
                    snapshot: entry.snapshot,
                    outcome: ResolveOutcome::Repaired { dangling: pointer },
                });
            }

            if seeded {
                break;
            }
            self.seed()?;
            seeded = true;
        }

        Err(SnapshotError::Storage(StorageError::unavailable(
            "seed snapshot could not be read back",
        )))
    }

    /// Commit the seed inventory and make it current.
    fn seed(&self) -> SnapshotResult<VersionHash> {
        let snapshot = Snapshot::new(seed_items(), None, self.clock.now());
        let hash = self.versions.commit(&snapshot)?;
        self.versions.set_current_pointer(&hash)?;
        info!(hash = %hash, "Seeded empty store");
        Ok(hash)
    }
}

//! Content-addressed inventory history for stockpile.
//!
//! This crate provides an inventory whose every edit produces a new,
//! immutable snapshot:
//! - Snapshots are stored under the SHA-256 digest of their canonical JSON
//! - Each snapshot links to the one it was derived from
//! - A current pointer names the snapshot consumers operate on, and is
//!   repaired or seeded automatically when missing or broken
//! - Writes from other execution contexts are reported through a notifier
//!
//! # Example
//!
//! ```
//! use stockpile_snapshot::{Inventory, ItemDraft};
//! use stockpile_storage::MemoryStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let inventory = Inventory::new(MemoryStore::new());
//!
//! // A fresh store starts with the example inventory.
//! let current = inventory.resolve_current()?;
//! assert_eq!(current.snapshot.items().len(), 2);
//!
//! let commit = inventory.upsert_item(None, "Lantern", ItemDraft::new(3.0, ["camping"]))?;
//! assert_eq!(commit.parent, current.hash);
//!
//! // The previous snapshot is still there.
//! assert_eq!(inventory.list_all_versions()?.len(), 2);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod error;
mod snapshot;

pub mod clock;
pub mod config;
pub mod hash;
pub mod import;
pub mod inventory;
pub mod notifier;
pub mod resolver;
pub mod store;
pub mod verify;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{SnapshotError, SnapshotResult};
pub use hash::VersionHash;
pub use inventory::{Commit, Inventory};
pub use notifier::{ChangeKind, ChangeNotifier, ExternalChange, Subscription};
pub use resolver::{RepairPolicy, ResolveOutcome, Resolved};
pub use snapshot::{normalize_quantity, Item, ItemDraft, Items, Snapshot, MAX_QUANTITY};
pub use store::{VersionEntry, VersionStore};
pub use verify::VerifyReport;

//! Snapshot storage on top of a key/value backend.
//!
//! Two key families are used:
//! ```text
//! current-sha             -> digest of the current snapshot
//! data-version-<digest>   -> canonical JSON of the snapshot with that digest
//! ```
//! Snapshots are written once and never rewritten or removed.

use crate::hash::{digest_text, VersionHash};
use crate::{Snapshot, SnapshotError, SnapshotResult};
use std::cmp::Ordering;
use stockpile_storage::KeyValueStore;
use tracing::{debug, warn};

/// Key holding the current pointer.
pub const CURRENT_KEY: &str = "current-sha";

/// Prefix of every snapshot key.
pub const VERSION_PREFIX: &str = "data-version-";

/// Storage key of a snapshot.
pub fn version_key(hash: &VersionHash) -> String {
    format!("{VERSION_PREFIX}{hash}")
}

/// Digest named by a snapshot key, if `key` is one.
pub fn parse_version_key(key: &str) -> Option<VersionHash> {
    key.strip_prefix(VERSION_PREFIX)
        .filter(|digest| !digest.is_empty())
        .map(VersionHash::from_string)
}

/// A stored snapshot together with the digest it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub hash: VersionHash,
    pub snapshot: Snapshot,
}

impl VersionEntry {
    /// Newest first; equal timestamps fall back to digest order.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.snapshot
            .timestamp()
            .cmp(&a.snapshot.timestamp())
            .then_with(|| a.hash.cmp(&b.hash))
    }
}

/// Result of reading every snapshot key.
#[derive(Debug, Default)]
pub struct Scan {
    /// Snapshots that parsed.
    pub entries: Vec<VersionEntry>,
    /// Keys whose contents did not parse, with the reason.
    pub malformed: Vec<(String, String)>,
}

/// Typed access to snapshots and the current pointer.
pub struct VersionStore<S> {
    store: S,
}

impl<S: KeyValueStore> VersionStore<S> {
    /// Wrap a key/value backend.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying backend.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Read the current pointer. Blank values count as absent.
    pub fn current_pointer(&self) -> SnapshotResult<Option<VersionHash>> {
        let raw = self.store.get(CURRENT_KEY)?;
        Ok(raw
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(VersionHash::from_string))
    }

    /// Point the current pointer at `hash`.
    pub fn set_current_pointer(&self, hash: &VersionHash) -> SnapshotResult<()> {
        debug!(hash = %hash, "Advancing current pointer");
        self.store.set(CURRENT_KEY, hash.as_str())?;
        Ok(())
    }

    /// Read a snapshot.
    ///
    /// Returns `None` if nothing is stored under `hash`, and
    /// [`SnapshotError::MalformedSnapshot`] if what is stored does not parse.
    pub fn load(&self, hash: &VersionHash) -> SnapshotResult<Option<Snapshot>> {
        let key = version_key(hash);
        match self.store.get(&key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SnapshotError::malformed(key, e)),
            None => Ok(None),
        }
    }

    /// Read a snapshot that must exist.
    pub fn require(&self, hash: &VersionHash) -> SnapshotResult<Snapshot> {
        self.load(hash)?
            .ok_or_else(|| SnapshotError::not_found(hash.as_str()))
    }

    /// Whether anything is stored under `hash`.
    pub fn contains(&self, hash: &VersionHash) -> SnapshotResult<bool> {
        Ok(self.store.get(&version_key(hash))?.is_some())
    }

    /// Store a snapshot under its content hash. The current pointer is not touched.
    pub fn commit(&self, snapshot: &Snapshot) -> SnapshotResult<VersionHash> {
        let text = snapshot.to_canonical_json()?;
        let hash = digest_text(&text);
        self.store.set(&version_key(&hash), &text)?;
        debug!(hash = %hash, items = snapshot.items().len(), "Stored snapshot");
        Ok(hash)
    }

    /// Digests of every stored snapshot key, readable or not.
    pub fn version_hashes(&self) -> SnapshotResult<Vec<VersionHash>> {
        Ok(self
            .store
            .keys()?
            .filter_map(|key| parse_version_key(&key))
            .collect())
    }

    /// Read every snapshot, setting aside the ones that do not parse.
    pub fn scan(&self) -> SnapshotResult<Scan> {
        let mut scan = Scan::default();
        for hash in self.version_hashes()? {
            match self.load(&hash) {
                Ok(Some(snapshot)) => scan.entries.push(VersionEntry { hash, snapshot }),
                // Vanished between listing and reading.
                Ok(None) => {}
                Err(SnapshotError::MalformedSnapshot { key, reason }) => {
                    warn!(key = %key, reason = %reason, "Skipping malformed snapshot");
                    scan.malformed.push((key, reason));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scan)
    }

    /// Every readable snapshot, newest first.
    pub fn list(&self) -> SnapshotResult<Vec<VersionEntry>> {
        let mut entries = self.scan()?.entries;
        entries.sort_by(VersionEntry::newest_first);
        Ok(entries)
    }
}

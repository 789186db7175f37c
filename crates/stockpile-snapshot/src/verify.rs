//! Integrity checks over the whole store.
//!
//! Checks, for every snapshot key:
//!
//! 1. the stored text parses;
//! 2. the digest in the key equals the hash of the parsed snapshot;
//! 3. a non-null `previousVersion` names a stored snapshot key.
//!
//! and that the current pointer names a readable snapshot. Nothing is repaired.

use crate::hash::{hash_snapshot, VersionHash};
use crate::store::VersionStore;
use crate::SnapshotResult;
use std::collections::HashSet;
use stockpile_storage::KeyValueStore;

/// A snapshot stored under a digest that is not its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMismatch {
    pub stored: VersionHash,
    pub computed: VersionHash,
}

/// A snapshot whose parent is not in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingParent {
    pub child: VersionHash,
    pub parent: VersionHash,
}

/// Findings of [`verify_store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Number of snapshot keys examined.
    pub checked: usize,
    pub hash_mismatches: Vec<HashMismatch>,
    /// Keys whose contents did not parse, with the reason.
    pub malformed: Vec<(String, String)>,
    pub dangling_parents: Vec<DanglingParent>,
    /// Value of the current pointer.
    pub current: Option<VersionHash>,
    /// Whether the current pointer names a readable snapshot.
    pub current_valid: bool,
}

impl VerifyReport {
    /// Whether no problem was found.
    pub fn is_clean(&self) -> bool {
        self.hash_mismatches.is_empty()
            && self.malformed.is_empty()
            && self.dangling_parents.is_empty()
            && self.current_valid
    }
}

/// Check every stored snapshot and the current pointer.
pub fn verify_store<S: KeyValueStore>(versions: &VersionStore<S>) -> SnapshotResult<VerifyReport> {
    let known: HashSet<VersionHash> = versions.version_hashes()?.into_iter().collect();
    let scan = versions.scan()?;

    let mut report = VerifyReport {
        checked: scan.entries.len() + scan.malformed.len(),
        malformed: scan.malformed,
        ..VerifyReport::default()
    };

    for entry in &scan.entries {
        let computed = hash_snapshot(&entry.snapshot)?;
        if computed != entry.hash {
            report.hash_mismatches.push(HashMismatch {
                stored: entry.hash.clone(),
                computed,
            });
        }
        if let Some(parent) = entry.snapshot.previous_version() {
            if !known.contains(parent) {
                report.dangling_parents.push(DanglingParent {
                    child: entry.hash.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    report.current = versions.current_pointer()?;
    report.current_valid = match &report.current {
        Some(hash) => scan.entries.iter().any(|e| &e.hash == hash),
        None => false,
    };

    report.hash_mismatches.sort_by(|a, b| a.stored.cmp(&b.stored));
    report.dangling_parents.sort_by(|a, b| a.child.cmp(&b.child));
    report.malformed.sort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{version_key, CURRENT_KEY};
    use crate::{Item, Items, Snapshot};
    use chrono::{TimeZone, Utc};
    use stockpile_storage::MemoryStore;

    fn snapshot(previous: Option<VersionHash>) -> Snapshot {
        let mut items = Items::new();
        items.insert("Rope".to_string(), Item::new(2, ["outdoor"]));
        Snapshot::new(
            items,
            previous,
            Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap(),
        )
    }

    #[test]
    fn test_clean_store() {
        let store = MemoryStore::new();
        let versions = VersionStore::new(&store);
        let root = versions.commit(&snapshot(None)).unwrap();
        let child = versions.commit(&snapshot(Some(root))).unwrap();
        versions.set_current_pointer(&child).unwrap();

        let report = verify_store(&versions).unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.checked, 2);
        assert_eq!(report.current, Some(child));
    }

    #[test]
    fn test_detects_tampering() {
        let store = MemoryStore::new();
        let versions = VersionStore::new(&store);
        let root = versions.commit(&snapshot(None)).unwrap();
        versions.set_current_pointer(&root).unwrap();

        // Rewrite the stored text without changing its key.
        let mut items = Items::new();
        items.insert("Rope".to_string(), Item::new(99, ["outdoor"]));
        let forged = Snapshot::new(items, None, snapshot(None).timestamp());
        store
            .set(&version_key(&root), &forged.to_canonical_json().unwrap())
            .unwrap();

        let report = verify_store(&versions).unwrap();
        assert_eq!(report.hash_mismatches.len(), 1);
        assert_eq!(report.hash_mismatches[0].stored, root);
        assert_eq!(report.hash_mismatches[0].computed, forged.hash().unwrap());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_detects_dangling_parent_and_bad_pointer() {
        let store = MemoryStore::new();
        let versions = VersionStore::new(&store);
        let orphan = versions
            .commit(&snapshot(Some(VersionHash::from_string("missing"))))
            .unwrap();
        store.set("data-version-junk", "[]").unwrap();
        store.set(CURRENT_KEY, "junk").unwrap();

        let report = verify_store(&versions).unwrap();
        assert_eq!(
            report.dangling_parents,
            vec![DanglingParent {
                child: orphan,
                parent: VersionHash::from_string("missing"),
            }]
        );
        assert_eq!(report.malformed.len(), 1);
        assert_eq!(report.checked, 2);
        assert!(!report.current_valid);
    }
}

//! End-to-end behavior of the versioned inventory.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use stockpile_snapshot::resolver::seed_items;
use stockpile_snapshot::store::{version_key, CURRENT_KEY};
use stockpile_snapshot::{
    ChangeKind, ChangeNotifier, Inventory, Item, ItemDraft, Items, ManualClock, RepairPolicy,
    ResolveOutcome, Snapshot, SnapshotError, VersionHash,
};
use stockpile_storage::{FileStore, KeyValueStore, Keys, MemoryStore, StorageResult};
use tempfile::TempDir;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap()
}

fn inventory<S: KeyValueStore>(store: S) -> Inventory<S> {
    Inventory::new(store).with_clock(Arc::new(ManualClock::new(start())))
}

fn snapshot_with(name: &str, at: DateTime<Utc>) -> Snapshot {
    let mut items = Items::new();
    items.insert(name.to_string(), Item::new(1, ["t"]));
    Snapshot::new(items, None, at)
}

#[test]
fn hash_is_deterministic_and_sensitive() {
    let a = snapshot_with("Cup", start());
    let b = snapshot_with("Cup", start());
    assert_eq!(a.hash().unwrap(), b.hash().unwrap());

    let renamed = snapshot_with("Mug", start());
    let later = snapshot_with("Cup", start() + Duration::milliseconds(1));
    let mut items = a.items().clone();
    items.insert("Cup".to_string(), Item::new(2, ["t"]));
    let requantified = Snapshot::new(items, None, start());
    let linked = Snapshot::new(a.items().clone(), Some(a.hash().unwrap()), start());

    for other in [renamed, later, requantified, linked] {
        assert_ne!(other.hash().unwrap(), a.hash().unwrap());
    }
}

#[test]
fn serialization_round_trips() {
    let inventory = inventory(MemoryStore::new());
    let commit = inventory
        .upsert_item(None, "Kettle", ItemDraft::new(1.0, ["kitchen", "kitchen"]))
        .unwrap();

    let text = commit.snapshot.to_canonical_json().unwrap();
    let parsed = Snapshot::from_json(&text).unwrap();
    assert_eq!(parsed, commit.snapshot);
    // Duplicate tags are kept as given.
    assert_eq!(parsed.item("Kettle").unwrap().tags, vec!["kitchen", "kitchen"]);
}

#[test]
fn empty_store_bootstraps_seed_items() {
    let inventory = inventory(MemoryStore::new());
    let resolved = inventory.resolve_current().unwrap();

    assert_eq!(resolved.outcome, ResolveOutcome::Seeded);
    assert_eq!(resolved.snapshot.items(), &seed_items());
    assert_eq!(
        resolved.snapshot.item("Example Item"),
        Some(&Item::new(2, ["example tag", "another example tag"]))
    );
    assert_eq!(
        resolved.snapshot.item("Example Item #2"),
        Some(&Item::new(20, ["example tag"]))
    );
}

#[test]
fn mutations_grow_the_chain() {
    let store = MemoryStore::new();
    let inventory = inventory(&store);
    let before = inventory.resolve_current().unwrap();

    let commit = inventory
        .upsert_item(None, "Tent", ItemDraft::new(1.0, ["camping"]))
        .unwrap();

    assert_eq!(commit.snapshot.previous_version(), Some(&before.hash));
    assert_eq!(inventory.get_version(&before.hash).unwrap(), before.snapshot);
    assert_eq!(
        store.get(CURRENT_KEY).unwrap().as_deref(),
        Some(commit.hash.as_str())
    );
    assert!(store.get(&version_key(&before.hash)).unwrap().is_some());
}

#[test]
fn duplicate_insert_leaves_item_unchanged() {
    let inventory = inventory(MemoryStore::new());
    inventory
        .upsert_item(None, "X", ItemDraft::new(5.0, ["first"]))
        .unwrap();

    let err = inventory
        .upsert_item(None, "X", ItemDraft::new(9.0, ["second"]))
        .unwrap_err();

    assert!(matches!(err, SnapshotError::DuplicateName(ref name) if name == "X"));
    assert!(err.is_validation());
    let items = inventory.current_items().unwrap();
    assert_eq!(items["X"], Item::new(5, ["first"]));
}

#[test]
fn rename_to_self_updates_in_place() {
    let inventory = inventory(MemoryStore::new());
    inventory
        .upsert_item(None, "X", ItemDraft::new(5.0, ["first"]))
        .unwrap();

    let commit = inventory
        .upsert_item(Some("X"), "X", ItemDraft::new(8.0, ["second"]))
        .unwrap();

    assert_eq!(commit.snapshot.item("X"), Some(&Item::new(8, ["second"])));
    assert_eq!(commit.snapshot.items().len(), seed_items().len() + 1);
}

#[test]
fn repair_picks_earliest_snapshot() {
    let store = MemoryStore::new();
    let inventory = inventory(&store);
    let t1 = inventory
        .versions()
        .commit(&snapshot_with("Old", start()))
        .unwrap();
    let t2 = inventory
        .versions()
        .commit(&snapshot_with("New", start() + Duration::hours(1)))
        .unwrap();

    // No pointer.
    assert_eq!(inventory.resolve_current().unwrap().hash, t1);

    // Dangling pointer.
    store.set(CURRENT_KEY, "f".repeat(64).as_str()).unwrap();
    let resolved = inventory.resolve_current().unwrap();
    assert_eq!(resolved.hash, t1);
    assert!(matches!(resolved.outcome, ResolveOutcome::Repaired { dangling: Some(_) }));

    // Other policy.
    store.set(CURRENT_KEY, "").unwrap();
    let latest = Inventory::new(&store).with_repair_policy(RepairPolicy::Latest);
    assert_eq!(latest.resolve_current().unwrap().hash, t2);
}

#[test]
fn negative_quantity_is_coerced_to_one() {
    let inventory = inventory(MemoryStore::new());
    let commit = inventory
        .upsert_item(None, "Y", ItemDraft::new(-5.0, Vec::<String>::new()))
        .unwrap();
    assert_eq!(commit.snapshot.item("Y"), Some(&Item::new(1, Vec::<String>::new())));

    for odd in [2.5, f64::NAN, f64::INFINITY, 1e300] {
        let commit = inventory
            .upsert_item(Some("Y"), "Y", ItemDraft::new(odd, Vec::<String>::new()))
            .unwrap();
        assert_eq!(commit.snapshot.item("Y").unwrap().quantity, 1);
    }
}

#[test]
fn schema_violations_commit_nothing() {
    let store = MemoryStore::new();
    let inventory = inventory(&store);
    let before = inventory.resolve_current().unwrap();
    let keys_before = store.keys().unwrap().count();

    for bad in [
        json!("text"),
        json!({"A": {"quantity": "many", "tags": []}}),
        json!({"A": {"quantity": 1, "tags": [1]}}),
        json!({"A": {"quantity": 1, "tags": [], "extra": true}}),
    ] {
        let err = inventory.replace_all(&bad).unwrap_err();
        assert!(matches!(err, SnapshotError::SchemaViolation(_)), "{bad}");
    }

    assert_eq!(inventory.resolve_current().unwrap().hash, before.hash);
    assert_eq!(store.keys().unwrap().count(), keys_before);
}

#[test]
fn history_restore_and_verify() {
    let inventory = inventory(MemoryStore::new());
    let seed = inventory.resolve_current().unwrap();
    let cleared = inventory.replace_all(&json!({})).unwrap();
    assert!(cleared.snapshot.items().is_empty());

    let restored = inventory.restore_to(&seed.hash).unwrap();
    assert_eq!(restored.snapshot.items(), &seed_items());

    let history: Vec<VersionHash> = inventory
        .history()
        .unwrap()
        .into_iter()
        .map(|e| e.hash)
        .collect();
    assert_eq!(history, vec![restored.hash.clone(), cleared.hash.clone(), seed.hash.clone()]);

    let listed: Vec<VersionHash> = inventory
        .list_all_versions()
        .unwrap()
        .into_iter()
        .map(|e| e.hash)
        .collect();
    assert_eq!(listed, history);

    let report = inventory.verify().unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.checked, 3);
}

#[test]
fn notifier_reports_other_contexts_only() {
    let first = MemoryStore::new();
    let second = first.open_context();
    let notifier = ChangeNotifier::watching(&first).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = notifier.subscribe(move |change| sink.lock().unwrap().push(change.kind.clone()));

    // Local edits are silent.
    let local = inventory(&first);
    local.resolve_current().unwrap();
    assert!(seen.lock().unwrap().is_empty());

    // A remote edit shows up as a new version followed by a pointer move.
    let remote = inventory(&second);
    let commit = remote
        .upsert_item(None, "Remote", ItemDraft::new(1.0, Vec::<String>::new()))
        .unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ChangeKind::Version(commit.hash.clone()), ChangeKind::CurrentPointer]
    );

    // And the local view picks it up on the next resolve.
    assert_eq!(local.resolve_current().unwrap().hash, commit.hash);

    subscription.unsubscribe();
    remote.delete_item("Remote").unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

/// A store handle that runs a callback just before its first write.
struct BeforeFirstWrite {
    inner: MemoryStore,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl KeyValueStore for BeforeFirstWrite {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.set(key, value)
    }

    fn keys(&self) -> StorageResult<Keys<'_>> {
        self.inner.keys()
    }
}

#[test]
fn interleaved_commits_from_two_contexts() {
    let shared = MemoryStore::new();
    let head = inventory(&shared).resolve_current().unwrap().hash;

    // Context A commits after context B resolved the head but before B writes.
    let first_commit = Arc::new(Mutex::new(None));
    let slot = first_commit.clone();
    let tab_a = shared.open_context();
    let hook: Box<dyn FnOnce() + Send> = Box::new(move || {
        let commit = inventory(tab_a)
            .upsert_item(None, "From A", ItemDraft::new(1.0, ["a"]))
            .unwrap();
        *slot.lock().unwrap() = Some(commit);
    });
    let tab_b = BeforeFirstWrite {
        inner: shared.open_context(),
        hook: Mutex::new(Some(hook)),
    };
    let second = inventory(tab_b)
        .upsert_item(None, "From B", ItemDraft::new(2.0, ["b"]))
        .unwrap();
    let first = first_commit.lock().unwrap().take().expect("context A committed");

    // Both were derived from the same head.
    assert_eq!(first.parent, head);
    assert_eq!(second.parent, head);
    assert_ne!(first.hash, second.hash);

    // The last committer wins the pointer; its snapshot never saw A's edit.
    let reader = inventory(&shared);
    let resolved = reader.resolve_current().unwrap();
    assert_eq!(resolved.outcome, ResolveOutcome::Current);
    assert_eq!(resolved.hash, second.hash);
    assert!(resolved.snapshot.item("From A").is_none());
    assert!(resolved.snapshot.item("From B").is_some());

    // Both snapshots stay retrievable.
    for commit in [&first, &second] {
        let stored = reader.get_version(&commit.hash).unwrap();
        assert_eq!(stored.previous_version(), Some(&head));
        assert_eq!(&stored, &commit.snapshot);
    }
    assert_eq!(reader.list_all_versions().unwrap().len(), 3);
}

#[test]
fn file_store_persists_between_handles() {
    let dir = TempDir::new().unwrap();
    let commit = {
        let inventory = inventory(FileStore::new(dir.path()));
        inventory
            .upsert_item(None, "Crate", ItemDraft::new(12.0, ["storage"]))
            .unwrap()
    };

    let reopened = inventory(FileStore::new(dir.path()));
    let resolved = reopened.resolve_current().unwrap();
    assert_eq!(resolved.hash, commit.hash);
    assert_eq!(resolved.outcome, ResolveOutcome::Current);
    assert_eq!(resolved.snapshot.item("Crate").unwrap().quantity, 12);
}

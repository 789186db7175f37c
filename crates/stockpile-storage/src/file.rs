//! File-based storage implementation.
//!
//! This storage backend stores each key as a separate file named after the
//! key: `current-sha` -> `<base>/current-sha`. Each write goes to its own
//! hidden temporary file and is renamed into place, so readers and writers
//! in other processes never observe a half-written value.

use crate::{
    ChangeFeed, ChangeListener, KeyValueStore, Keys, StorageError, StorageEvent, StorageResult,
    WatchGuard,
};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// Writes awaiting their watcher event are capped per key.
const MAX_PENDING: usize = 1024;

/// What this handle knows about one key.
#[derive(Debug, Default)]
struct KnownValue {
    /// Values written through this handle whose watcher event has not been seen, oldest first.
    pending: VecDeque<String>,
    /// The value last written, echoed back or reported.
    last: Option<String>,
}

/// Per-key bookkeeping shared by a handle, its clones and its watchers.
type KnownValues = Arc<Mutex<HashMap<String, KnownValue>>>;

/// File-based storage.
#[derive(Clone)]
pub struct FileStore {
    base_path: PathBuf,
    known: KnownValues,
}

impl FileStore {
    /// Create a new file storage rooted at the given directory.
    ///
    /// The directory is created on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            known: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The directory holding the key files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a key.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Record a write whose watcher event is still to come.
    fn expect_echo(&self, key: &str, value: &str) {
        if let Ok(mut known) = self.known.lock() {
            let entry = known.entry(key.to_string()).or_default();
            entry.pending.push_back(value.to_string());
            if entry.pending.len() > MAX_PENDING {
                entry.pending.pop_front();
            }
        }
    }

    /// Withdraw a write that never landed.
    fn forget_echo(&self, key: &str, value: &str) {
        if let Ok(mut known) = self.known.lock() {
            if let Some(entry) = known.get_mut(key) {
                if let Some(pos) = entry.pending.iter().rposition(|v| v == value) {
                    entry.pending.remove(pos);
                }
            }
        }
    }
}

/// Reject keys that cannot be mapped to a plain file name in the base directory.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_key("Key cannot be empty"));
    }
    if key.contains('/') || key.contains('\\') || key.starts_with('.') || key.contains('\0') {
        return Err(StorageError::invalid_key(format!(
            "unsupported key {:?}",
            key
        )));
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Reading from storage");

        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(&format!("read {key}"), e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Writing to storage");

        fs::create_dir_all(&self.base_path)
            .map_err(|e| StorageError::from_io("create store directory", e))?;

        // Write atomically (write to a unique temp file, then rename).
        // The temp file is removed on drop if anything fails.
        let mut temp = NamedTempFile::new_in(&self.base_path)
            .map_err(|e| StorageError::from_io(&format!("write {key}"), e))?;
        temp.write_all(value.as_bytes())
            .map_err(|e| StorageError::from_io(&format!("write {key}"), e))?;

        // The watcher may see the rename before `persist` returns.
        self.expect_echo(key, value);
        if let Err(e) = temp.persist(&path) {
            self.forget_echo(key, value);
            return Err(StorageError::from_io(&format!("write {key}"), e.error));
        }

        Ok(())
    }

    fn keys(&self) -> StorageResult<Keys<'_>> {
        debug!(path = %self.base_path.display(), "Listing storage");

        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => return Err(StorageError::from_io("list store directory", e)),
        };

        let keys = entries.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    return None;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                return None;
            }
            let name = entry.file_name().into_string().ok()?;
            validate_key(&name).ok()?;
            Some(name)
        });

        Ok(Box::new(keys))
    }
}

impl ChangeFeed for FileStore {
    fn watch(&self, listener: ChangeListener) -> StorageResult<WatchGuard> {
        fs::create_dir_all(&self.base_path)
            .map_err(|e| StorageError::from_io("create store directory", e))?;

        let known = self.known.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => handle_event(&event, &known, &listener),
            Err(e) => warn!(error = %e, "Store watcher error"),
        })?;
        watcher.watch(&self.base_path, RecursiveMode::NonRecursive)?;
        debug!(path = %self.base_path.display(), "Watching storage");

        Ok(WatchGuard::new(watcher))
    }
}

/// Translate a raw watcher event into [`StorageEvent`]s for keys whose content
/// this handle has not seen yet.
fn handle_event(event: &Event, known: &KnownValues, listener: &ChangeListener) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }

    for path in &event.paths {
        let Some(key) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if validate_key(key).is_err() {
            continue;
        }

        let value = match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read changed key");
                continue;
            }
        };

        if take_if_new(known, key, value.as_deref()) {
            trace!(key, "foreign write");
            listener(&StorageEvent {
                key: key.to_string(),
                new_value: value,
            });
        }
    }
}

/// Record `value` as the content of `key`, returning whether another writer put it there.
///
/// A value matching a pending local write settles that write and every older
/// one, since the file has moved past them.
fn take_if_new(known: &KnownValues, key: &str, value: Option<&str>) -> bool {
    let Ok(mut known) = known.lock() else {
        return false;
    };
    let entry = known.entry(key.to_string()).or_default();
    match value {
        Some(value) => {
            if let Some(pos) = entry.pending.iter().position(|v| v == value) {
                entry.pending.drain(..=pos);
                entry.last = Some(value.to_string());
                false
            } else if entry.last.as_deref() == Some(value) {
                false
            } else {
                entry.last = Some(value.to_string());
                true
            }
        }
        None => {
            entry.last = None;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("current-sha", "abc123").unwrap();
        assert_eq!(store.get("current-sha").unwrap(), Some("abc123".to_string()));
        assert!(dir.path().join("current-sha").exists());
    }

    #[test]
    fn test_read_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("missing"));
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_keys_of_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("missing"));
        assert_eq!(store.keys().unwrap().count(), 0);
    }

    #[test]
    fn test_keys_skip_hidden_and_directories() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("data-version-1", "{}").unwrap();
        store.set("data-version-2", "{}").unwrap();
        fs::write(dir.path().join(".data-version-3.tmp"), "partial").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let mut keys: Vec<String> = store.keys().unwrap().collect();
        keys.sort();
        assert_eq!(keys, vec!["data-version-1", "data-version-2"]);
    }

    #[test]
    fn test_persists_across_handles() {
        let dir = tempdir().unwrap();
        FileStore::new(dir.path()).set("key", "value").unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get("key").unwrap(), Some("value".to_string()));
    }

    #[test]
    fn test_invalid_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        // Empty key
        assert!(store.set("", "x").is_err());

        // Path traversal attempt
        assert!(store.set("..", "x").is_err());
        assert!(store.set("../etc", "x").is_err());

        // Separators and hidden names
        assert!(store.set("path/traversal", "x").is_err());
        assert!(store.set("back\\slash", "x").is_err());
        assert!(store.get(".hidden").is_err());
    }

    fn hidden_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.unwrap().file_name().into_string().ok())
            .filter(|name| name.starts_with('.'))
            .collect()
    }

    #[test]
    fn test_take_if_new_suppresses_known_values() {
        let known: KnownValues = Arc::new(Mutex::new(HashMap::new()));
        known.lock().unwrap().insert(
            "current-sha".to_string(),
            KnownValue {
                pending: VecDeque::new(),
                last: Some("a".to_string()),
            },
        );

        assert!(!take_if_new(&known, "current-sha", Some("a")));
        assert!(take_if_new(&known, "current-sha", Some("b")));
        // Already reported once.
        assert!(!take_if_new(&known, "current-sha", Some("b")));
        assert!(take_if_new(&known, "current-sha", None));
        assert!(take_if_new(&known, "current-sha", Some("b")));
    }

    #[test]
    fn test_watch_reports_foreign_writes_only() {
        let dir = tempdir().unwrap();
        let local = FileStore::new(dir.path());
        let foreign = FileStore::new(dir.path());

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let _guard = local
            .watch(Arc::new(move |event: &StorageEvent| {
                let _ = tx.lock().unwrap().send(event.clone());
            }))
            .unwrap();

        local.set("own-key", "mine").unwrap();
        foreign.set("their-key", "theirs").unwrap();

        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("foreign write was not reported");
            assert_ne!(event.key, "own-key");
            if event.key == "their-key" {
                assert_eq!(event.new_value.as_deref(), Some("theirs"));
                break;
            }
        }
    }

    #[test]
    fn test_take_if_new_settles_superseded_writes() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for value in ["1", "2", "3"] {
            store.expect_echo("current-sha", value);
        }

        // The event for write 1 arrives after write 2 landed.
        assert!(!take_if_new(&store.known, "current-sha", Some("2")));
        assert!(!take_if_new(&store.known, "current-sha", Some("2")));
        assert!(!take_if_new(&store.known, "current-sha", Some("3")));
        assert!(store.known.lock().unwrap()["current-sha"].pending.is_empty());

        // Someone else writing an old value is still news.
        assert!(take_if_new(&store.known, "current-sha", Some("1")));
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        fs::create_dir(dir.path().join("current-sha")).unwrap();

        assert!(store.set("current-sha", "abc").is_err());
        assert!(hidden_files(dir.path()).is_empty());
        assert!(store.known.lock().unwrap()["current-sha"].pending.is_empty());
    }

    #[test]
    fn test_successful_writes_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for i in 0..20 {
            store.set("current-sha", &i.to_string()).unwrap();
        }
        assert!(hidden_files(dir.path()).is_empty());
        assert_eq!(store.get("current-sha").unwrap(), Some("19".to_string()));
    }

    #[test]
    fn test_concurrent_writers_never_tear_values() {
        let dir = tempdir().unwrap();
        let writers: Vec<_> = ['a', 'b']
            .into_iter()
            .map(|fill| {
                let store = FileStore::new(dir.path());
                std::thread::spawn(move || {
                    let value = fill.to_string().repeat(64 * 1024);
                    for _ in 0..200 {
                        store.set("current-sha", &value).unwrap();
                        let read = store.get("current-sha").unwrap().unwrap();
                        assert_eq!(read.len(), value.len());
                        let first = read.chars().next().unwrap();
                        assert!(read.chars().all(|c| c == first), "torn value");
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        assert!(hidden_files(dir.path()).is_empty());
    }

    #[test]
    fn test_watch_ignores_rapid_own_writes() {
        let dir = tempdir().unwrap();
        let local = FileStore::new(dir.path());
        let foreign = FileStore::new(dir.path());

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let _guard = local
            .watch(Arc::new(move |event: &StorageEvent| {
                let _ = tx.lock().unwrap().send(event.clone());
            }))
            .unwrap();

        for i in 0..1000 {
            local.set("current-sha", &format!("{i:064}")).unwrap();
        }
        foreign.set("their-key", "theirs").unwrap();

        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("foreign write was not reported");
            assert_ne!(event.key, "current-sha", "own write reported: {event:?}");
            if event.key == "their-key" {
                break;
            }
        }

        std::thread::sleep(Duration::from_millis(300));
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event.key, "current-sha", "own write reported: {event:?}");
        }
    }
}

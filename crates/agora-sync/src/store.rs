//! Persisted offline state.
//!
//! Two JSON blobs live under the data directory:
//!
//! ```text
//! <dir>/
//!   offline_actions.json   # {"version":1,"actions":[...],"dead_letters":[...]}
//!   offline_cache.json     # {"version":1,"snapshots":{"<key>":{...}}}
//!   offline.lock           # fs2 lock held around every read-modify-write
//! ```
//!
//! A blob whose version does not match, or that fails to parse, is moved aside
//! to `<name>.discarded` and treated as empty.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use agora_core::error::{OfflineError, StorageError};
use agora_core::repo::{QueuedAction, Record};
use agora_core::Result;

const ACTIONS_FILE: &str = "offline_actions.json";
const CACHE_FILE: &str = "offline_cache.json";
const LOCK_FILE: &str = "offline.lock";

/// Version written into both blobs.
pub const FORMAT_VERSION: u32 = 1;

fn map_io(path: &Path) -> impl FnOnce(std::io::Error) -> agora_core::Error + '_ {
    move |e| StorageError::io(path, e).into()
}

/// The last successful online read for a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineSnapshot {
    /// Cache key the snapshot was stored under.
    pub key: String,
    /// Rows returned by the read.
    pub payload: Vec<Record>,
    /// When the read completed.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ActionsBlob {
    version: u32,
    #[serde(default)]
    actions: Vec<QueuedAction>,
    #[serde(default)]
    dead_letters: Vec<QueuedAction>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheBlob {
    version: u32,
    #[serde(default)]
    snapshots: BTreeMap<String, OfflineSnapshot>,
}

trait Versioned: Default {
    fn stamp(&mut self);
}

impl Versioned for ActionsBlob {
    fn stamp(&mut self) {
        self.version = FORMAT_VERSION;
    }
}

impl Versioned for CacheBlob {
    fn stamp(&mut self) {
        self.version = FORMAT_VERSION;
    }
}

/// Filesystem-backed store for the offline queue and read snapshots.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    dir: PathBuf,
}

impl OfflineStore {
    /// Create a store rooted at `dir`. Nothing is touched until first use.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn actions_path(&self) -> PathBuf {
        self.dir.join(ACTIONS_FILE)
    }

    fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    fn lock(&self) -> Result<File> {
        fs::create_dir_all(&self.dir).map_err(map_io(&self.dir))?;

        let lock_path = self.dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(map_io(&lock_path))?;
        lock_file.lock_exclusive().map_err(map_io(&lock_path))?;

        Ok(lock_file)
    }

    /// Run `f` on a blob while holding the store lock, then write it back.
    fn modify<B, T>(&self, path: &Path, f: impl FnOnce(&mut B) -> Result<T>) -> Result<T>
    where
        B: Versioned + Serialize + DeserializeOwned,
    {
        let lock_file = self.lock()?;

        let mut blob: B = load_blob(path)?;
        let out = f(&mut blob)?;
        blob.stamp();
        write_blob(path, &blob)?;

        lock_file.unlock().map_err(map_io(path))?;
        Ok(out)
    }

    fn read<B>(&self, path: &Path) -> Result<B>
    where
        B: Versioned + DeserializeOwned,
    {
        let lock_file = self.lock()?;
        let blob = load_blob(path)?;
        lock_file.unlock().map_err(map_io(path))?;
        Ok(blob)
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Append an action to the queue.
    ///
    /// # Errors
    ///
    /// With `limit` set, fails with [`OfflineError::QueueFull`] once the queue
    /// holds that many actions. Nothing is dropped.
    #[instrument(skip(self, action), fields(action_id = %action.id, kind = %action.kind, collection = %action.collection))]
    pub fn push_action(&self, action: QueuedAction, limit: Option<usize>) -> Result<()> {
        self.modify(&self.actions_path(), |blob: &mut ActionsBlob| {
            if let Some(limit) = limit {
                if blob.actions.len() >= limit {
                    return Err(OfflineError::QueueFull { limit }.into());
                }
            }
            blob.actions.push(action);
            debug!(queued = blob.actions.len(), "Queued offline action");
            Ok(())
        })
    }

    /// Queued actions in insertion order.
    pub fn pending_actions(&self) -> Result<Vec<QueuedAction>> {
        Ok(self.read::<ActionsBlob>(&self.actions_path())?.actions)
    }

    /// Remove one queued action. Returns whether it was present.
    pub fn remove_action(&self, id: Uuid) -> Result<bool> {
        self.modify(&self.actions_path(), |blob: &mut ActionsBlob| {
            let before = blob.actions.len();
            blob.actions.retain(|a| a.id != id);
            Ok(blob.actions.len() != before)
        })
    }

    /// Count a failed replay and remember its error.
    ///
    /// Returns the updated action, or `None` if it is no longer queued.
    pub fn record_failure(&self, id: Uuid, error: &str) -> Result<Option<QueuedAction>> {
        self.modify(&self.actions_path(), |blob: &mut ActionsBlob| {
            Ok(blob.actions.iter_mut().find(|a| a.id == id).map(|action| {
                action.attempts += 1;
                action.last_error = Some(error.to_string());
                action.clone()
            }))
        })
    }

    /// Move a queued action to the dead letter list.
    pub fn move_to_dead_letter(&self, id: Uuid) -> Result<bool> {
        self.modify(&self.actions_path(), |blob: &mut ActionsBlob| {
            match blob.actions.iter().position(|a| a.id == id) {
                Some(index) => {
                    let action = blob.actions.remove(index);
                    blob.dead_letters.push(action);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Actions that exhausted their replay attempts.
    pub fn dead_letters(&self) -> Result<Vec<QueuedAction>> {
        Ok(self.read::<ActionsBlob>(&self.actions_path())?.dead_letters)
    }

    /// Drop all dead letters. Returns how many were removed.
    pub fn clear_dead_letters(&self) -> Result<usize> {
        self.modify(&self.actions_path(), |blob: &mut ActionsBlob| {
            Ok(std::mem::take(&mut blob.dead_letters).len())
        })
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Overwrite the snapshot for `key` with fresh rows.
    #[instrument(skip(self, payload), fields(rows = payload.len()))]
    pub fn put_snapshot(&self, key: &str, payload: Vec<Record>) -> Result<()> {
        self.modify(&self.cache_path(), |blob: &mut CacheBlob| {
            blob.snapshots.insert(
                key.to_string(),
                OfflineSnapshot {
                    key: key.to_string(),
                    payload,
                    timestamp: Utc::now(),
                },
            );
            Ok(())
        })
    }

    /// The snapshot for `key`, if one was stored.
    pub fn snapshot(&self, key: &str) -> Result<Option<OfflineSnapshot>> {
        Ok(self
            .read::<CacheBlob>(&self.cache_path())?
            .snapshots
            .remove(key))
    }

    /// Drop every snapshot.
    pub fn clear_snapshots(&self) -> Result<()> {
        self.modify(&self.cache_path(), |blob: &mut CacheBlob| {
            blob.snapshots.clear();
            Ok(())
        })
    }
}

fn load_blob<B: Versioned + DeserializeOwned>(path: &Path) -> Result<B> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(B::default()),
        Err(e) => return Err(StorageError::io(path, e).into()),
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Offline blob is corrupt, discarding");
            discard(path)?;
            return Ok(B::default());
        }
    };

    let version = value.get("version").and_then(Value::as_u64);
    if version != Some(u64::from(FORMAT_VERSION)) {
        warn!(
            path = %path.display(),
            found = ?version,
            expected = FORMAT_VERSION,
            "Offline blob has an unknown version, discarding"
        );
        discard(path)?;
        return Ok(B::default());
    }

    match serde_json::from_value(value) {
        Ok(blob) => Ok(blob),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Offline blob does not match its schema, discarding");
            discard(path)?;
            Ok(B::default())
        }
    }
}

fn discard(path: &Path) -> Result<()> {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".discarded");
    fs::rename(path, &aside).map_err(map_io(path))?;
    Ok(())
}

fn write_blob<B: Serialize>(path: &Path, blob: &B) -> Result<()> {
    let content = serde_json::to_string_pretty(blob).map_err(StorageError::from)?;

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &content).map_err(map_io(&temp_path))?;
    fs::rename(&temp_path, path).map_err(map_io(path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::repo::ActionKind;
    use agora_core::types::Collection;
    use agora_core::Error;
    use serde_json::json;
    use tempfile::TempDir;

    fn action(title: &str) -> QueuedAction {
        QueuedAction::new(
            ActionKind::Create,
            Collection::new("posts").unwrap(),
            Record::new(json!({"title": title})).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn empty_store_has_nothing_queued() {
        let temp = TempDir::new().unwrap();
        let store = OfflineStore::new(temp.path());

        assert!(store.pending_actions().unwrap().is_empty());
        assert!(store.dead_letters().unwrap().is_empty());
        assert!(store.snapshot("posts").unwrap().is_none());
    }

    #[test]
    fn queue_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let first = action("one");
        let second = action("two");

        let store = OfflineStore::new(temp.path());
        store.push_action(first.clone(), None).unwrap();
        store.push_action(second.clone(), None).unwrap();

        let reopened = OfflineStore::new(temp.path());
        let pending = reopened.pending_actions().unwrap();
        assert_eq!(pending, vec![first, second]);
    }

    #[test]
    fn remove_action_by_id() {
        let temp = TempDir::new().unwrap();
        let store = OfflineStore::new(temp.path());
        let keep = action("keep");
        let gone = action("gone");
        store.push_action(keep.clone(), None).unwrap();
        store.push_action(gone.clone(), None).unwrap();

        assert!(store.remove_action(gone.id).unwrap());
        assert!(!store.remove_action(gone.id).unwrap());
        assert_eq!(store.pending_actions().unwrap(), vec![keep]);
    }

    #[test]
    fn queue_bound_rejects_without_dropping() {
        let temp = TempDir::new().unwrap();
        let store = OfflineStore::new(temp.path());
        store.push_action(action("a"), Some(1)).unwrap();

        let err = store.push_action(action("b"), Some(1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Offline(OfflineError::QueueFull { limit: 1 })
        ));
        assert_eq!(store.pending_actions().unwrap().len(), 1);
    }

    #[test]
    fn failures_and_dead_letters() {
        let temp = TempDir::new().unwrap();
        let store = OfflineStore::new(temp.path());
        let queued = action("flaky");
        store.push_action(queued.clone(), None).unwrap();

        let updated = store
            .record_failure(queued.id, "HTTP 500")
            .unwrap()
            .unwrap();
        assert_eq!(updated.attempts, 1);
        assert_eq!(updated.last_error.as_deref(), Some("HTTP 500"));

        assert!(store.move_to_dead_letter(queued.id).unwrap());
        assert!(store.pending_actions().unwrap().is_empty());
        assert_eq!(store.dead_letters().unwrap()[0].attempts, 1);

        assert_eq!(store.clear_dead_letters().unwrap(), 1);
        assert!(store.dead_letters().unwrap().is_empty());
    }

    #[test]
    fn snapshot_is_overwritten() {
        let temp = TempDir::new().unwrap();
        let store = OfflineStore::new(temp.path());
        let row = |t: &str| Record::new(json!({"id": t})).unwrap();

        store.put_snapshot("posts", vec![row("p1")]).unwrap();
        store.put_snapshot("posts", vec![row("p2"), row("p3")]).unwrap();

        let snapshot = store.snapshot("posts").unwrap().unwrap();
        assert_eq!(snapshot.key, "posts");
        assert_eq!(snapshot.payload.len(), 2);

        store.clear_snapshots().unwrap();
        assert!(store.snapshot("posts").unwrap().is_none());
    }

    #[test]
    fn unknown_version_is_discarded() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(ACTIONS_FILE),
            r#"{"version": 7, "actions": [{"weird": true}]}"#,
        )
        .unwrap();

        let store = OfflineStore::new(temp.path());
        assert!(store.pending_actions().unwrap().is_empty());
        assert!(temp.path().join("offline_actions.json.discarded").exists());

        store.push_action(action("fresh"), None).unwrap();
        let raw: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join(ACTIONS_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["version"], json!(FORMAT_VERSION));
    }

    #[test]
    fn corrupt_blob_is_discarded() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CACHE_FILE), "{not json").unwrap();

        let store = OfflineStore::new(temp.path());
        assert!(store.snapshot("anything").unwrap().is_none());
        assert!(!temp.path().join(CACHE_FILE).exists());
    }
}

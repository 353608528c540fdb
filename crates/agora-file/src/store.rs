//! Filesystem storage for the file backend.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use agora_core::Result;
use agora_core::error::{ProtocolError, StorageError};
use agora_core::repo::{Filter, Record};
use agora_core::types::{Collection, RecordId};

fn map_io(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |err| StorageError::io(path, err)
}

/// An entry in the change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChangeLogEntry {
    /// The collection of the changed row.
    pub collection: String,
    /// RFC 3339 commit timestamp.
    pub time: String,
    /// The operation type.
    pub op: ChangeLogOp,
    /// The row after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    /// The row before the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

/// The type of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChangeLogOp {
    Insert,
    Update,
    Delete,
}

/// Filesystem-backed row storage.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new file store at the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tables_dir(&self) -> PathBuf {
        self.root.join("tables")
    }

    fn collection_dir(&self, collection: &Collection) -> PathBuf {
        self.tables_dir().join(collection.as_str())
    }

    /// Escape an id into a filesystem-safe file stem.
    fn id_file_stem(id: &RecordId) -> String {
        let mut out = String::with_capacity(id.as_str().len());
        for b in id.as_str().bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                out.push(b as char);
            } else {
                out.push_str(&format!("%{:02X}", b));
            }
        }
        out
    }

    fn row_path(&self, collection: &Collection, id: &RecordId) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.json", Self::id_file_stem(id)))
    }

    /// Get the change log path.
    pub(crate) fn changes_path(&self) -> PathBuf {
        self.root.join("changes.jsonl")
    }

    fn changes_lock_path(&self) -> PathBuf {
        self.root.join("changes.lock")
    }

    fn append_change(
        &self,
        collection: &Collection,
        op: ChangeLogOp,
        new: Option<&Record>,
        old: Option<&Record>,
    ) -> Result<()> {
        let changes_path = self.changes_path();
        let lock_path = self.changes_lock_path();

        fs::create_dir_all(&self.root).map_err(map_io(&self.root))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(map_io(&lock_path))?;

        lock_file.lock_exclusive().map_err(map_io(&lock_path))?;

        let entry = ChangeLogEntry {
            collection: collection.to_string(),
            time: Utc::now().to_rfc3339(),
            op,
            new: new.map(Record::to_value),
            old: old.map(Record::to_value),
        };

        let line = serde_json::to_string(&entry).map_err(StorageError::from)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&changes_path)
            .map_err(map_io(&changes_path))?;

        writeln!(file, "{}", line).map_err(map_io(&changes_path))?;
        file.sync_data().map_err(map_io(&changes_path))?;

        lock_file.unlock().map_err(map_io(&lock_path))?;

        Ok(())
    }

    fn write_row(&self, collection: &Collection, id: &RecordId, record: &Record) -> Result<()> {
        let path = self.row_path(collection, id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(map_io(parent))?;
        }

        let content = serde_json::to_string_pretty(record).map_err(StorageError::from)?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content).map_err(map_io(&temp_path))?;
        fs::rename(&temp_path, &path).map_err(map_io(&path))?;

        Ok(())
    }

    fn read_row(path: &Path) -> Result<Record> {
        let content = fs::read_to_string(path).map_err(map_io(path))?;
        let record = serde_json::from_str(&content).map_err(StorageError::from)?;
        Ok(record)
    }

    // ========================================================================
    // Row Operations
    // ========================================================================

    /// Read every row of a collection, in file-name order.
    pub fn list_rows(&self, collection: &Collection) -> Result<Vec<Record>> {
        let dir = self.collection_dir(collection);

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<_> = fs::read_dir(&dir)
            .map_err(map_io(&dir))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();

        entries.sort();

        let mut rows = Vec::with_capacity(entries.len());
        for path in entries {
            match Self::read_row(&path) {
                Ok(record) => rows.push(record),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable row"),
            }
        }

        Ok(rows)
    }

    /// Read one row by id.
    pub fn get_row(&self, collection: &Collection, id: &RecordId) -> Result<Option<Record>> {
        let path = self.row_path(collection, id);

        if !path.exists() {
            return Ok(None);
        }

        Self::read_row(&path).map(Some)
    }

    /// Insert a row, assigning `id` and `created_at` when missing.
    #[instrument(skip(self, record), fields(%collection))]
    pub fn insert_row(&self, collection: &Collection, record: &Record) -> Result<Record> {
        let mut row = record.clone();

        let id = match row.id() {
            Some(id) => id,
            None => {
                let id = RecordId::new(Uuid::new_v4().to_string())?;
                row.insert("id", Value::String(id.to_string()));
                id
            }
        };

        if row.get("created_at").is_none() {
            row.insert("created_at", Value::String(Utc::now().to_rfc3339()));
        }

        if self.row_path(collection, &id).exists() {
            return Err(ProtocolError::new(
                409,
                Some("23505".to_string()),
                Some(format!("duplicate key value: id {} already exists", id)),
            )
            .into());
        }

        self.write_row(collection, &id, &row)?;
        self.append_change(collection, ChangeLogOp::Insert, Some(&row), None)?;

        debug!(%id, "Inserted row");

        Ok(row)
    }

    /// Merge `patch` into every matching row. Returns the number of rows changed.
    #[instrument(skip(self, patch), fields(%collection, %filter))]
    pub fn update_rows(
        &self,
        collection: &Collection,
        filter: &Filter,
        patch: &Record,
    ) -> Result<usize> {
        let mut changed = 0;

        for old in self.list_rows(collection)? {
            if !filter.matches(&old) {
                continue;
            }
            let Some(id) = old.id() else {
                continue;
            };

            let mut new = old.clone();
            new.merge(patch);

            self.write_row(collection, &id, &new)?;
            self.append_change(collection, ChangeLogOp::Update, Some(&new), Some(&old))?;
            changed += 1;
        }

        debug!(changed, "Updated rows");

        Ok(changed)
    }

    /// Delete every matching row. Returns the number of rows removed.
    #[instrument(skip(self), fields(%collection, %filter))]
    pub fn delete_rows(&self, collection: &Collection, filter: &Filter) -> Result<usize> {
        let mut removed = 0;

        for old in self.list_rows(collection)? {
            if !filter.matches(&old) {
                continue;
            }
            let Some(id) = old.id() else {
                continue;
            };

            let path = self.row_path(collection, &id);
            fs::remove_file(&path).map_err(map_io(&path))?;
            self.append_change(collection, ChangeLogOp::Delete, None, Some(&old))?;
            removed += 1;
        }

        debug!(removed, "Deleted rows");

        Ok(removed)
    }
}

//! In-memory list cache and the pure patch operations applied to it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use agora_core::repo::{Query, Record};
use agora_core::types::{Collection, RecordId};

/// Key of one cached list: the collection plus the query signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for the rows `query` returns from `collection`.
    pub fn new(collection: &Collection, query: &Query) -> Self {
        let signature = query.signature();
        if signature.is_empty() {
            Self(collection.to_string())
        } else {
            Self(format!("{}?{}", collection, signature))
        }
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered lists of rows, shared between readers and the realtime patcher.
#[derive(Debug, Default)]
pub struct ListCache {
    lists: RwLock<HashMap<CacheKey, Vec<Record>>>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the cached list.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Record>> {
        self.lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Replace the cached list.
    pub fn put(&self, key: CacheKey, rows: Vec<Record>) {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, rows);
    }

    /// Modify a cached list in place. Returns `None` if nothing is cached under `key`.
    pub fn update<R>(&self, key: &CacheKey, f: impl FnOnce(&mut Vec<Record>) -> R) -> Option<R> {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(key)
            .map(f)
    }

    /// Forget one list.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Forget every list.
    pub fn clear(&self) {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.lists.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Put `record` at the front of the list.
///
/// An entry with the same id is removed first, so a list never holds two
/// copies of one row.
pub fn prepend_record(list: &mut Vec<Record>, record: Record) {
    if let Some(id) = record.id() {
        remove_by_id(list, &id);
    }
    list.insert(0, record);
}

/// Shallow-merge `patch` into the entry with the patch's id.
///
/// Returns whether an entry was found. Order is unchanged.
pub fn merge_update(list: &mut [Record], patch: &Record) -> bool {
    let Some(id) = patch.id() else {
        return false;
    };
    match list.iter_mut().find(|r| r.has_id(&id)) {
        Some(entry) => {
            entry.merge(patch);
            true
        }
        None => false,
    }
}

/// Remove the first entry with `id`. Returns whether one was removed.
pub fn remove_by_id(list: &mut Vec<Record>, id: &RecordId) -> bool {
    match list.iter().position(|r| r.has_id(id)) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

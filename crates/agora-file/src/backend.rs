//! File-backed backend implementation.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument};

use agora_core::error::ProtocolError;
use agora_core::repo::{Filter, Query, Record, Subscription};
use agora_core::traits::Backend;
use agora_core::types::{Collection, RecordId};
use agora_core::Result;

use crate::feed::FileFeed;
use crate::store::FileStore;

/// Filesystem-backed backend.
///
/// Joins are not evaluated: the `select` expression of a read is accepted
/// and ignored, so re-fetched rows carry only their own columns.
#[derive(Debug, Clone)]
pub struct FileBackend {
    store: FileStore,
}

impl FileBackend {
    /// Create a backend rooted at the given directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            store: FileStore::new(root),
        }
    }

    /// Access the underlying file store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }
}

#[async_trait]
impl Backend for FileBackend {
    type Feed = FileFeed;

    #[instrument(skip(self, query), fields(%collection))]
    async fn select(&self, collection: &Collection, query: &Query) -> Result<Vec<Record>> {
        debug!(query = %query.signature(), "Selecting rows");
        let rows = self.store.list_rows(collection)?;
        Ok(query.apply(rows))
    }

    #[instrument(skip(self), fields(%collection, %id))]
    async fn fetch_one(
        &self,
        collection: &Collection,
        id: &RecordId,
        _select: Option<&str>,
    ) -> Result<Record> {
        self.store
            .get_row(collection, id)?
            .ok_or_else(|| ProtocolError::not_found(format!("{} row {}", collection, id)).into())
    }

    async fn insert(&self, collection: &Collection, record: &Record) -> Result<Record> {
        self.store.insert_row(collection, record)
    }

    async fn update(&self, collection: &Collection, filter: &Filter, patch: &Record) -> Result<()> {
        self.store.update_rows(collection, filter, patch).map(|_| ())
    }

    async fn delete(&self, collection: &Collection, filter: &Filter) -> Result<()> {
        self.store.delete_rows(collection, filter).map(|_| ())
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<Self::Feed> {
        FileFeed::from_store(self.store.clone(), subscription)
    }
}

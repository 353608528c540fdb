//! Backend trait.

use async_trait::async_trait;

use crate::repo::{ActionKind, Filter, Query, QueuedAction, Record, Subscription};
use crate::types::{Collection, RecordId};
use crate::Result;

use super::ChangeFeed;

/// A backend exposing named collections and a change feed.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Change feed type for this backend.
    type Feed: ChangeFeed;

    /// Read rows from a collection.
    async fn select(&self, collection: &Collection, query: &Query) -> Result<Vec<Record>>;

    /// Read one row by id, with an optional join expression.
    async fn fetch_one(
        &self,
        collection: &Collection,
        id: &RecordId,
        select: Option<&str>,
    ) -> Result<Record>;

    /// Insert a row and return it as stored.
    async fn insert(&self, collection: &Collection, record: &Record) -> Result<Record>;

    /// Shallow-merge `patch` into every row matching `filter`.
    async fn update(&self, collection: &Collection, filter: &Filter, patch: &Record) -> Result<()>;

    /// Delete every row matching `filter`.
    async fn delete(&self, collection: &Collection, filter: &Filter) -> Result<()>;

    /// Subscribe to changes.
    async fn subscribe(&self, subscription: Subscription) -> Result<Self::Feed>;

    /// Apply a queued action. Returns the stored row for creates.
    async fn apply(&self, action: &QueuedAction) -> Result<Option<Record>> {
        match action.kind {
            ActionKind::Create => self
                .insert(&action.collection, &action.payload)
                .await
                .map(Some),
            ActionKind::Update => {
                let filter = action.target_filter()?;
                self.update(&action.collection, &filter, &action.payload)
                    .await
                    .map(|_| None)
            }
            ActionKind::Delete => {
                let filter = action.target_filter()?;
                self.delete(&action.collection, &filter).await.map(|_| None)
            }
        }
    }
}

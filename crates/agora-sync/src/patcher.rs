//! Keeps one cached list current from a change feed.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, instrument, warn};

use agora_core::repo::{ChangeEvent, ChangeKind, Query, Record, Subscription};
use agora_core::traits::{Backend, ChangeFeed};
use agora_core::types::Collection;
use agora_core::Result;

use crate::cache::{self, CacheKey, ListCache};

/// What applying one event did to the cached list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// A row was put at the front of the list.
    Inserted,
    /// Pushed fields were merged into an existing entry.
    Updated,
    /// The entry with the event's id was removed.
    Removed,
    /// The event did not touch the list.
    Ignored,
}

/// Applies insert, update and delete events to the cached list of one query.
///
/// Pushed rows never carry joined fields, so inserts re-fetch the row with the
/// query's `select` expression before they are cached. Updates merge into the
/// cached entry and keep whatever joined fields it already has.
pub struct RealtimePatcher<B> {
    backend: Arc<B>,
    cache: Arc<ListCache>,
    collection: Collection,
    query: Query,
    key: CacheKey,
}

impl<B: Backend> RealtimePatcher<B> {
    pub fn new(backend: Arc<B>, cache: Arc<ListCache>, collection: Collection, query: Query) -> Self {
        let key = CacheKey::new(&collection, &query);
        Self {
            backend,
            cache,
            collection,
            query,
            key,
        }
    }

    /// Key of the list this patcher maintains.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The current cached list.
    pub fn rows(&self) -> Option<Vec<Record>> {
        self.cache.get(&self.key)
    }

    /// Subscription for this list: the collection, narrowed by the query's
    /// first filter.
    pub fn subscription(&self) -> Subscription {
        let subscription = Subscription::new(self.collection.clone());
        match self.query.filters.first() {
            Some(filter) => subscription.with_filter(filter.clone()),
            None => subscription,
        }
    }

    /// Read the list from the backend and cache it.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self) -> Result<Vec<Record>> {
        let rows = self.backend.select(&self.collection, &self.query).await?;
        debug!(rows = rows.len(), "Loaded list");
        self.cache.put(self.key.clone(), rows.clone());
        Ok(rows)
    }

    /// Apply one event.
    ///
    /// Events for a list that is not cached are ignored; the next load
    /// brings it up to date.
    #[instrument(skip_all, fields(key = %self.key, kind = event.kind_name()))]
    pub async fn apply(&self, event: ChangeEvent) -> PatchOutcome {
        if event.collection != self.collection {
            return PatchOutcome::Ignored;
        }

        match event.kind {
            ChangeKind::Insert { new } => self.apply_insert(new).await,
            ChangeKind::Update { new, .. } => {
                let merged = self
                    .cache
                    .update(&self.key, |list| cache::merge_update(list, &new));
                match merged {
                    Some(true) => PatchOutcome::Updated,
                    _ => PatchOutcome::Ignored,
                }
            }
            ChangeKind::Delete { old } => {
                let Some(id) = old.id() else {
                    warn!("Delete event without an id");
                    return PatchOutcome::Ignored;
                };
                let removed = self
                    .cache
                    .update(&self.key, |list| cache::remove_by_id(list, &id));
                match removed {
                    Some(true) => PatchOutcome::Removed,
                    _ => PatchOutcome::Ignored,
                }
            }
        }
    }

    async fn apply_insert(&self, new: Record) -> PatchOutcome {
        if !self.query.matches(&new) {
            return PatchOutcome::Ignored;
        }
        let Some(id) = new.id() else {
            warn!("Insert event without an id");
            return PatchOutcome::Ignored;
        };
        if self.cache.get(&self.key).is_none() {
            return PatchOutcome::Ignored;
        }

        let record = match self
            .backend
            .fetch_one(&self.collection, &id, self.query.select.as_deref())
            .await
        {
            Ok(full) => full,
            Err(e) => {
                warn!(%id, error = %e, "Re-fetch failed, caching the pushed row");
                new
            }
        };

        match self
            .cache
            .update(&self.key, |list| cache::prepend_record(list, record))
        {
            Some(()) => PatchOutcome::Inserted,
            None => PatchOutcome::Ignored,
        }
    }

    /// Apply events until the feed ends. Returns how many changed the list.
    ///
    /// Events are handled one at a time; an insert's re-fetch completes before
    /// the next event is read. Feed errors are logged and skipped.
    pub async fn run<F: ChangeFeed>(&self, feed: F) -> usize {
        let mut feed = std::pin::pin!(feed);
        let mut changed = 0;

        while let Some(item) = feed.next().await {
            match item {
                Ok(event) => {
                    if self.apply(event).await != PatchOutcome::Ignored {
                        changed += 1;
                    }
                }
                Err(e) => warn!(key = %self.key, error = %e, "Change feed error"),
            }
        }

        debug!(key = %self.key, changed, "Change feed ended");
        changed
    }
}

//! Offline queue and resync.
//!
//! Mutations made while offline are appended to the persisted queue. When
//! connectivity returns, [`SyncEngine::sync_offline_actions`] replays the
//! queue in enqueue order, one action at a time. A failed action stays queued
//! and the batch moves on; the user gets one notice for the whole batch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use agora_core::error::{OfflineError, TransportError};
use agora_core::repo::{ActionKind, Query, QueuedAction, Record};
use agora_core::traits::Backend;
use agora_core::types::Collection;
use agora_core::Result;

use crate::cache::{CacheKey, ListCache};
use crate::connectivity::Connectivity;
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::store::OfflineStore;

/// Limits applied by the engine. Every limit is off by default.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Reject new offline actions once this many are queued.
    pub max_queued_actions: Option<usize>,
    /// Move an action to the dead letter list after this many failed replays.
    pub max_attempts: Option<u32>,
    /// Give up on a single replayed call after this long.
    pub action_timeout: Option<Duration>,
}

/// Result of a mutation request.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Applied to the backend. Creates carry the stored row.
    Applied(Option<Record>),
    /// Queued for replay.
    Queued(QueuedAction),
}

/// Counts for one replay batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Actions applied and dequeued.
    pub applied: usize,
    /// Actions that failed in this batch.
    pub failed: usize,
    /// Failed actions that hit `max_attempts` and left the queue.
    pub dead_lettered: usize,
    /// Actions still queued after the batch.
    pub remaining: usize,
}

/// Outcome of [`SyncEngine::sync_offline_actions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    /// Another replay was already in progress; nothing was done.
    AlreadyRunning,
    /// The client is offline; nothing was done.
    Offline,
    /// The queue snapshot was replayed.
    Completed(SyncSummary),
}

/// Drives offline mutations, resync and offline reads for one backend.
pub struct SyncEngine<B> {
    backend: Arc<B>,
    store: OfflineStore,
    connectivity: Connectivity,
    cache: Arc<ListCache>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    sync_guard: Mutex<()>,
}

impl<B: Backend> SyncEngine<B> {
    /// Create an engine with an empty list cache, a logging notifier and
    /// default limits.
    pub fn new(backend: Arc<B>, store: OfflineStore, connectivity: Connectivity) -> Self {
        Self {
            backend,
            store,
            connectivity,
            cache: Arc::new(ListCache::new()),
            notifier: Arc::new(TracingNotifier),
            config: SyncConfig::default(),
            sync_guard: Mutex::new(()),
        }
    }

    /// Share an existing list cache.
    pub fn with_cache(mut self, cache: Arc<ListCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Send batch notices somewhere other than the log.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn store(&self) -> &OfflineStore {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn cache(&self) -> &Arc<ListCache> {
        &self.cache
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a mutation to the offline queue, stamped with the current time.
    #[instrument(skip(self, payload), fields(%kind, %collection))]
    pub fn queue_offline_action(
        &self,
        kind: ActionKind,
        collection: Collection,
        payload: Record,
    ) -> Result<QueuedAction> {
        let action = QueuedAction::new(kind, collection, payload)?;
        self.store
            .push_action(action.clone(), self.config.max_queued_actions)?;
        info!(action_id = %action.id, "Mutation queued for replay");
        Ok(action)
    }

    /// Apply a mutation now when online, or queue it when offline.
    #[instrument(skip(self, payload), fields(%kind, %collection))]
    pub async fn mutate(
        &self,
        kind: ActionKind,
        collection: Collection,
        payload: Record,
    ) -> Result<MutationOutcome> {
        if !self.connectivity.is_online() {
            return self
                .queue_offline_action(kind, collection, payload)
                .map(MutationOutcome::Queued);
        }

        let action = QueuedAction::new(kind, collection, payload)?;
        let stored = self.backend.apply(&action).await?;
        debug!("Mutation applied");
        Ok(MutationOutcome::Applied(stored))
    }

    // ========================================================================
    // Resync
    // ========================================================================

    /// Replay the offline queue.
    ///
    /// At most one replay runs at a time; a call made while another is in
    /// progress returns [`SyncReport::AlreadyRunning`] immediately. Only
    /// local storage failures abort the batch.
    #[instrument(skip(self))]
    pub async fn sync_offline_actions(&self) -> Result<SyncReport> {
        let Ok(_guard) = self.sync_guard.try_lock() else {
            debug!("Replay already in progress");
            return Ok(SyncReport::AlreadyRunning);
        };

        if !self.connectivity.is_online() {
            debug!("Offline, not replaying");
            return Ok(SyncReport::Offline);
        }

        let mut actions = self.store.pending_actions()?;
        if actions.is_empty() {
            return Ok(SyncReport::Completed(SyncSummary::default()));
        }

        // Stable, so equal timestamps keep insertion order.
        actions.sort_by_key(|a| a.enqueued_at);
        info!(count = actions.len(), "Replaying offline actions");

        let mut summary = SyncSummary::default();
        for action in &actions {
            match self.replay(action).await {
                Ok(_) => {
                    self.store.remove_action(action.id)?;
                    summary.applied += 1;
                    debug!(action_id = %action.id, kind = %action.kind, "Offline action applied");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        action_id = %action.id,
                        kind = %action.kind,
                        collection = %action.collection,
                        error = %e,
                        "Offline action failed, keeping it queued"
                    );

                    let updated = self.store.record_failure(action.id, &e.to_string())?;
                    if let (Some(max), Some(updated)) = (self.config.max_attempts, updated) {
                        if updated.attempts >= max {
                            self.store.move_to_dead_letter(action.id)?;
                            summary.dead_lettered += 1;
                            warn!(
                                action_id = %action.id,
                                attempts = updated.attempts,
                                "Offline action moved to dead letters"
                            );
                        }
                    }
                }
            }
        }

        self.cache.clear();
        summary.remaining = self.store.pending_actions()?.len();

        info!(
            applied = summary.applied,
            failed = summary.failed,
            dead_lettered = summary.dead_lettered,
            remaining = summary.remaining,
            "Replay finished"
        );
        self.notifier.notify(batch_notice(&summary, actions.len()));

        Ok(SyncReport::Completed(summary))
    }

    async fn replay(&self, action: &QueuedAction) -> Result<Option<Record>> {
        match self.config.action_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.apply(action))
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => self.backend.apply(action).await,
        }
    }

    /// Replay whenever connectivity is online with actions still queued.
    ///
    /// Checks once at start and again after every connectivity change, so a
    /// drop and return that collapses into a single observed value still
    /// drains the queue. Returns when `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut rx = self.connectivity.subscribe();
        let mut shutdown = std::pin::pin!(shutdown);

        let online = *rx.borrow_and_update();
        self.sync_if_pending(online).await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *rx.borrow_and_update();
                    self.sync_if_pending(online).await;
                }
            }
        }

        debug!("Sync loop stopped");
    }

    async fn sync_if_pending(&self, online: bool) {
        if !online {
            return;
        }
        match self.store.pending_actions() {
            Ok(actions) if actions.is_empty() => {}
            Ok(_) => self.sync_and_report().await,
            Err(e) => {
                warn!(error = %e, "Failed to read offline queue");
                self.sync_and_report().await;
            }
        }
    }

    async fn sync_and_report(&self) {
        if let Err(e) = self.sync_offline_actions().await {
            error!(error = %e, "Replay aborted");
            self.notifier
                .notify(Notice::error("Sync failed", e.to_string()));
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read rows, falling back to the last snapshot when the network is not
    /// available.
    ///
    /// A successful online read overwrites the snapshot under `key` and the
    /// cached list for the query. A transient failure while online serves the
    /// snapshot if there is one.
    ///
    /// # Errors
    ///
    /// [`OfflineError::NoSnapshot`] when offline with nothing stored.
    #[instrument(skip(self, query), fields(%collection))]
    pub async fn fetch_with_offline_fallback(
        &self,
        key: &str,
        collection: &Collection,
        query: &Query,
    ) -> Result<Vec<Record>> {
        if self.connectivity.is_online() {
            match self.backend.select(collection, query).await {
                Ok(rows) => {
                    self.store.put_snapshot(key, rows.clone())?;
                    self.cache.put(CacheKey::new(collection, query), rows.clone());
                    return Ok(rows);
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Online read failed, trying snapshot");
                    if let Some(snapshot) = self.store.snapshot(key)? {
                        return Ok(snapshot.payload);
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        match self.store.snapshot(key)? {
            Some(snapshot) => {
                debug!(taken_at = %snapshot.timestamp, "Serving offline snapshot");
                Ok(snapshot.payload)
            }
            None => Err(OfflineError::NoSnapshot {
                key: key.to_string(),
            }
            .into()),
        }
    }
}

fn batch_notice(summary: &SyncSummary, total: usize) -> Notice {
    if summary.failed == 0 {
        return Notice::success(
            "Offline changes synced",
            format!("{} of {} actions applied", summary.applied, total),
        );
    }

    let mut detail = format!(
        "{} of {} actions failed and will be retried",
        summary.failed, total
    );
    if summary.dead_lettered > 0 {
        detail = format!(
            "{} of {} actions failed; {} gave up after too many attempts",
            summary.failed, total, summary.dead_lettered
        );
    }
    Notice::error("Some offline changes failed to sync", detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_for_clean_batch() {
        let summary = SyncSummary {
            applied: 3,
            ..Default::default()
        };
        let notice = batch_notice(&summary, 3);
        assert_eq!(notice.level, crate::NoticeLevel::Success);
        assert_eq!(notice.detail, "3 of 3 actions applied");
    }

    #[test]
    fn notice_for_failed_batch() {
        let summary = SyncSummary {
            applied: 1,
            failed: 2,
            dead_lettered: 1,
            remaining: 1,
        };
        let notice = batch_notice(&summary, 3);
        assert_eq!(notice.level, crate::NoticeLevel::Error);
        assert!(notice.detail.contains("2 of 3"));
        assert!(notice.detail.contains("1 gave up"));
    }
}

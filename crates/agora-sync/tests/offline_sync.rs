//! Offline queue and resync against the file backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_core::error::{Error, OfflineError, ProtocolError};
use agora_core::repo::{ActionKind, Filter, Query, QueuedAction, Record, Subscription};
use agora_core::traits::Backend;
use agora_core::types::{Collection, RecordId};
use agora_file::{FileBackend, FileFeed};
use agora_sync::{
    CacheKey, Connectivity, MutationOutcome, Notice, NoticeLevel, Notifier, OfflineStore,
    SyncConfig, SyncEngine, SyncReport,
};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

// ============================================================================
// Test doubles
// ============================================================================

/// File backend that can reject or hold back selected inserts.
struct TestBackend {
    inner: FileBackend,
    fail_title: Option<&'static str>,
    gate: Option<Arc<Semaphore>>,
    entered: Arc<Notify>,
    inserts: AtomicUsize,
}

impl TestBackend {
    fn new(root: &std::path::Path) -> Self {
        Self {
            inner: FileBackend::new(root),
            fail_title: None,
            gate: None,
            entered: Arc::new(Notify::new()),
            inserts: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, title: &'static str) -> Self {
        self.fail_title = Some(title);
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Backend for TestBackend {
    type Feed = FileFeed;

    async fn select(&self, collection: &Collection, query: &Query) -> agora_core::Result<Vec<Record>> {
        self.inner.select(collection, query).await
    }

    async fn fetch_one(
        &self,
        collection: &Collection,
        id: &RecordId,
        select: Option<&str>,
    ) -> agora_core::Result<Record> {
        self.inner.fetch_one(collection, id, select).await
    }

    async fn insert(&self, collection: &Collection, record: &Record) -> agora_core::Result<Record> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if let Some(title) = self.fail_title {
            if record.get("title").is_some_and(|t| t == title) {
                return Err(ProtocolError::new(503, None, Some("unavailable".into())).into());
            }
        }
        self.inner.insert(collection, record).await
    }

    async fn update(
        &self,
        collection: &Collection,
        filter: &Filter,
        patch: &Record,
    ) -> agora_core::Result<()> {
        self.inner.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &Collection, filter: &Filter) -> agora_core::Result<()> {
        self.inner.delete(collection, filter).await
    }

    async fn subscribe(&self, subscription: Subscription) -> agora_core::Result<FileFeed> {
        self.inner.subscribe(subscription).await
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn posts() -> Collection {
    Collection::new("posts").unwrap()
}

fn row(value: serde_json::Value) -> Record {
    Record::new(value).unwrap()
}

fn post(id: &str, title: &str) -> Record {
    row(json!({"id": id, "title": title, "created_at": "2026-10-17T09:00:00Z"}))
}

struct Fixture {
    _temp: TempDir,
    engine: Arc<SyncEngine<TestBackend>>,
    notifier: Arc<RecordingNotifier>,
}

fn fixture(online: bool, configure: impl FnOnce(TestBackend) -> TestBackend, config: SyncConfig) -> Fixture {
    let temp = TempDir::new().unwrap();
    let backend = configure(TestBackend::new(&temp.path().join("remote")));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = SyncEngine::new(
        Arc::new(backend),
        OfflineStore::new(temp.path().join("local")),
        Connectivity::new(online),
    )
    .with_notifier(notifier.clone())
    .with_config(config);

    Fixture {
        _temp: temp,
        engine: Arc::new(engine),
        notifier,
    }
}

fn remote_rows(engine: &SyncEngine<TestBackend>) -> Vec<Record> {
    engine.backend().inner.store().list_rows(&posts()).unwrap()
}

fn script() -> Vec<(ActionKind, Record)> {
    vec![
        (ActionKind::Create, post("p1", "First")),
        (ActionKind::Create, post("p2", "Second")),
        (ActionKind::Update, row(json!({"id": "p1", "title": "First, edited"}))),
        (ActionKind::Delete, row(json!({"id": "p2"}))),
        (ActionKind::Create, post("p3", "Third")),
    ]
}

// ============================================================================
// Replay
// ============================================================================

#[tokio::test]
async fn test_replay_matches_online_application() {
    let online = fixture(true, |b| b, SyncConfig::default());
    for (kind, payload) in script() {
        let outcome = online.engine.mutate(kind, posts(), payload).await.unwrap();
        assert!(matches!(outcome, MutationOutcome::Applied(_)));
    }

    let offline = fixture(false, |b| b, SyncConfig::default());
    for (kind, payload) in script() {
        let outcome = offline.engine.mutate(kind, posts(), payload).await.unwrap();
        assert!(matches!(outcome, MutationOutcome::Queued(_)));
    }
    assert!(remote_rows(&offline.engine).is_empty());

    offline.engine.connectivity().set_online(true);
    let report = offline.engine.sync_offline_actions().await.unwrap();

    let SyncReport::Completed(summary) = report else {
        panic!("unexpected report {:?}", report);
    };
    assert_eq!(summary.applied, 5);
    assert_eq!(summary.remaining, 0);
    assert_eq!(remote_rows(&offline.engine), remote_rows(&online.engine));

    let notices = offline.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Success);
}

#[tokio::test]
async fn test_replay_orders_by_enqueue_time() {
    let f = fixture(true, |b| b, SyncConfig::default());
    let created = Utc::now();
    let edited = created + TimeDelta::seconds(1);

    // Stored order disagrees with enqueue time, as when two processes race.
    let update = QueuedAction::new_at(
        ActionKind::Update,
        posts(),
        row(json!({"id": "p1", "title": "Edited"})),
        edited,
    )
    .unwrap();
    let create = QueuedAction::new_at(ActionKind::Create, posts(), post("p1", "First"), created).unwrap();
    f.engine.store().push_action(update, None).unwrap();
    f.engine.store().push_action(create, None).unwrap();

    let SyncReport::Completed(summary) = f.engine.sync_offline_actions().await.unwrap() else {
        panic!("sync did not run");
    };
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.failed, 0);

    let rows = remote_rows(&f.engine);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), Some(&json!("Edited")));
}

#[tokio::test]
async fn test_replay_is_not_idempotent() {
    let f = fixture(true, |b| b, SyncConfig::default());
    let action = f
        .engine
        .queue_offline_action(ActionKind::Create, posts(), post("p1", "Once"))
        .unwrap();

    // Simulate a replay that committed remotely but never left the queue.
    f.engine.backend().apply(&action).await.unwrap();

    let report = f.engine.sync_offline_actions().await.unwrap();
    let SyncReport::Completed(summary) = report else {
        panic!("unexpected report {:?}", report);
    };
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.remaining, 1);
}

#[tokio::test]
async fn test_failed_action_stays_queued_and_batch_continues() {
    let f = fixture(true, |b| b.failing_on("boom"), SyncConfig::default());
    f.engine.connectivity().set_online(false);
    for (id, title) in [("a", "A"), ("b", "boom"), ("c", "C")] {
        f.engine
            .mutate(ActionKind::Create, posts(), post(id, title))
            .await
            .unwrap();
    }
    f.engine.connectivity().set_online(true);

    let report = f.engine.sync_offline_actions().await.unwrap();
    let SyncReport::Completed(summary) = report else {
        panic!("unexpected report {:?}", report);
    };
    assert_eq!((summary.applied, summary.failed, summary.remaining), (2, 1, 1));

    let ids: Vec<_> = remote_rows(&f.engine)
        .iter()
        .map(|r| r.id().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["a", "c"]);

    let pending = f.engine.store().pending_actions().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    assert!(pending[0].last_error.as_deref().unwrap().contains("503"));

    let notices = f.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_action_moves_to_dead_letters_after_max_attempts() {
    let config = SyncConfig {
        max_attempts: Some(2),
        ..Default::default()
    };
    let f = fixture(true, |b| b.failing_on("boom"), config);
    f.engine
        .queue_offline_action(ActionKind::Create, posts(), post("b", "boom"))
        .unwrap();

    f.engine.sync_offline_actions().await.unwrap();
    assert_eq!(f.engine.store().pending_actions().unwrap().len(), 1);

    let report = f.engine.sync_offline_actions().await.unwrap();
    let SyncReport::Completed(summary) = report else {
        panic!("unexpected report {:?}", report);
    };
    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(summary.remaining, 0);
    assert_eq!(f.engine.store().dead_letters().unwrap()[0].attempts, 2);
}

#[tokio::test]
async fn test_queue_bound_is_enforced() {
    let config = SyncConfig {
        max_queued_actions: Some(1),
        ..Default::default()
    };
    let f = fixture(false, |b| b, config);
    f.engine
        .mutate(ActionKind::Create, posts(), post("a", "A"))
        .await
        .unwrap();

    let err = f
        .engine
        .mutate(ActionKind::Create, posts(), post("b", "B"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Offline(OfflineError::QueueFull { limit: 1 })));
}

#[tokio::test]
async fn test_sync_while_offline_does_nothing() {
    let f = fixture(false, |b| b, SyncConfig::default());
    f.engine
        .queue_offline_action(ActionKind::Create, posts(), post("a", "A"))
        .unwrap();

    let report = f.engine.sync_offline_actions().await.unwrap();
    assert_eq!(report, SyncReport::Offline);
    assert_eq!(f.engine.store().pending_actions().unwrap().len(), 1);
    assert!(f.notifier.notices().is_empty());
}

#[tokio::test]
async fn test_empty_queue_sends_no_notice() {
    let f = fixture(true, |b| b, SyncConfig::default());
    let report = f.engine.sync_offline_actions().await.unwrap();
    assert!(matches!(report, SyncReport::Completed(s) if s.applied == 0));
    assert!(f.notifier.notices().is_empty());
}

#[tokio::test]
async fn test_concurrent_sync_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let f = fixture(true, |b| b.gated(gate.clone()), SyncConfig::default());
    f.engine
        .queue_offline_action(ActionKind::Create, posts(), post("a", "A"))
        .unwrap();

    let entered = f.engine.backend().entered.clone();
    let engine = f.engine.clone();
    let first = tokio::spawn(async move { engine.sync_offline_actions().await });

    entered.notified().await;
    let second = f.engine.sync_offline_actions().await.unwrap();
    assert_eq!(second, SyncReport::AlreadyRunning);

    gate.add_permits(1);
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SyncReport::Completed(s) if s.applied == 1));
    assert_eq!(f.engine.backend().inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_action_timeout_keeps_action_queued() {
    let gate = Arc::new(Semaphore::new(0));
    let config = SyncConfig {
        action_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let f = fixture(true, |b| b.gated(gate), config);
    f.engine
        .queue_offline_action(ActionKind::Create, posts(), post("a", "A"))
        .unwrap();

    let report = f.engine.sync_offline_actions().await.unwrap();
    assert!(matches!(report, SyncReport::Completed(s) if s.failed == 1 && s.remaining == 1));
    let pending = f.engine.store().pending_actions().unwrap();
    assert!(pending[0].last_error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_reconnect_triggers_replay() {
    let f = fixture(false, |b| b, SyncConfig::default());
    f.engine
        .mutate(ActionKind::Create, posts(), post("a", "A"))
        .await
        .unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let engine = f.engine.clone();
    let runner = tokio::spawn(async move {
        engine
            .run(async {
                let _ = stop_rx.await;
            })
            .await;
    });

    f.engine.connectivity().set_online(true);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !f.engine.store().pending_actions().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("queue was not replayed");

    assert_eq!(remote_rows(&f.engine).len(), 1);

    stop_tx.send(()).unwrap();
    runner.await.unwrap();
}

#[tokio::test]
async fn test_brief_drop_still_triggers_replay() {
    let f = fixture(true, |b| b, SyncConfig::default());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let engine = f.engine.clone();
    let runner = tokio::spawn(async move {
        engine
            .run(async {
                let _ = stop_rx.await;
            })
            .await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Both flips land before the loop wakes, so it only sees `true`.
    f.engine.connectivity().set_online(false);
    let outcome = f
        .engine
        .mutate(ActionKind::Create, posts(), post("a", "A"))
        .await
        .unwrap();
    assert!(matches!(outcome, MutationOutcome::Queued(_)));
    f.engine.connectivity().set_online(true);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !f.engine.store().pending_actions().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("queue was not replayed");

    assert_eq!(remote_rows(&f.engine).len(), 1);

    stop_tx.send(()).unwrap();
    runner.await.unwrap();
}

// ============================================================================
// Offline reads
// ============================================================================

#[tokio::test]
async fn test_fetch_falls_back_to_snapshot() {
    let f = fixture(true, |b| b, SyncConfig::default());
    f.engine
        .mutate(ActionKind::Create, posts(), post("a", "A"))
        .await
        .unwrap();
    let query = Query::new().order("id", false);

    let online = f
        .engine
        .fetch_with_offline_fallback("feed", &posts(), &query)
        .await
        .unwrap();
    assert_eq!(online.len(), 1);
    assert!(f.engine.cache().get(&CacheKey::new(&posts(), &query)).is_some());

    f.engine.connectivity().set_online(false);
    let offline = f
        .engine
        .fetch_with_offline_fallback("feed", &posts(), &query)
        .await
        .unwrap();
    assert_eq!(offline, online);

    let err = f
        .engine
        .fetch_with_offline_fallback("other", &posts(), &query)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Offline(OfflineError::NoSnapshot { ref key }) if key == "other"));
}

#[tokio::test]
async fn test_sync_invalidates_list_cache() {
    let f = fixture(true, |b| b, SyncConfig::default());
    let query = Query::new();
    f.engine
        .fetch_with_offline_fallback("feed", &posts(), &query)
        .await
        .unwrap();
    assert!(!f.engine.cache().is_empty());

    f.engine
        .queue_offline_action(ActionKind::Create, posts(), post("a", "A"))
        .unwrap();
    f.engine.sync_offline_actions().await.unwrap();

    assert!(f.engine.cache().is_empty());
    // The snapshot remains as the offline fallback.
    assert!(f.engine.store().snapshot("feed").unwrap().is_some());
}

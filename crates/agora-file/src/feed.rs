//! Change feed for the file backend.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use agora_core::Result;
use agora_core::error::{InvalidInputError, StorageError};
use agora_core::repo::{ChangeEvent, ChangeKind, Record, Subscription};
use agora_core::types::Collection;

use crate::store::{ChangeLogEntry, ChangeLogOp, FileStore};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Change feed tailing the file backend's change log.
///
/// Only changes appended after the feed was opened are delivered.
pub struct FileFeed {
    inner: Pin<Box<dyn Stream<Item = Result<ChangeEvent>> + Send>>,
}

impl FileFeed {
    pub(crate) fn from_store(store: FileStore, subscription: Subscription) -> Result<Self> {
        let root = store.root().to_path_buf();
        let changes_path = store.changes_path();

        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;

        let (tx, mut rx) = mpsc::channel::<Result<ChangeEvent>>(100);
        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel::<()>();

        let mut position = std::fs::metadata(&changes_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if !matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                ) {
                    return;
                }

                let is_change_log = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().is_some_and(|n| n == "changes.jsonl"));

                if is_change_log {
                    let _ = wake_tx.send(());
                }
            }
        })
        .map_err(|e| InvalidInputError::Other {
            message: format!("Failed to create file watcher: {}", e),
        })?;

        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|e| InvalidInputError::Other {
                message: format!("Failed to watch directory: {}", e),
            })?;

        debug!(collection = %subscription.collection, "Tailing change log");

        tokio::spawn(async move {
            let _watcher = watcher;
            let mut interval = tokio::time::interval(POLL_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    Some(()) = wake_rx.recv() => {}
                }

                if tx.is_closed() {
                    break;
                }

                for event in read_new_changes(&changes_path, &mut position) {
                    let event = match event {
                        Ok(event) if subscription.matches(&event) => Ok(event),
                        Ok(_) => continue,
                        Err(e) => Err(e),
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        Ok(Self {
            inner: Box::pin(stream),
        })
    }
}

impl Stream for FileFeed {
    type Item = Result<ChangeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Read complete lines appended since `position`, advancing it past them.
fn read_new_changes(changes_path: &Path, position: &mut u64) -> Vec<Result<ChangeEvent>> {
    let Ok(mut file) = File::open(changes_path) else {
        return Vec::new();
    };

    if file.seek(SeekFrom::Start(*position)).is_err() {
        return Vec::new();
    }

    let mut buf = String::new();
    if let Err(e) = file.read_to_string(&mut buf) {
        warn!(error = %e, "Failed to read change log");
        return Vec::new();
    }

    // A writer may be mid-line; leave the partial tail for the next read.
    let Some(end) = buf.rfind('\n') else {
        return Vec::new();
    };
    let complete = &buf[..=end];
    *position += complete.len() as u64;

    complete
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ChangeLogEntry>(line) {
            Ok(entry) => Some(entry_to_event(entry)),
            Err(e) => {
                warn!(error = %e, "Skipping malformed change log line");
                None
            }
        })
        .collect()
}

fn entry_to_event(entry: ChangeLogEntry) -> Result<ChangeEvent> {
    let collection = Collection::new(entry.collection)?;

    let commit_time = DateTime::parse_from_rfc3339(&entry.time)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    let row = |value: Option<serde_json::Value>| -> Result<Record> {
        value.map(Record::new).unwrap_or_else(|| {
            Err(InvalidInputError::Record {
                reason: "change log entry is missing a row".to_string(),
            }
            .into())
        })
    };

    let kind = match entry.op {
        ChangeLogOp::Insert => ChangeKind::Insert {
            new: row(entry.new)?,
        },
        ChangeLogOp::Update => ChangeKind::Update {
            new: row(entry.new)?,
            old: entry.old.map(Record::new).transpose()?,
        },
        ChangeLogOp::Delete => ChangeKind::Delete {
            old: row(entry.old)?,
        },
    };

    Ok(ChangeEvent {
        collection,
        commit_time,
        kind,
    })
}

//! Change-feed event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Collection, RecordId};

use super::{Filter, Record};

/// A change pushed by the backend for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The collection the row belongs to.
    pub collection: Collection,
    /// When the change was committed.
    pub commit_time: DateTime<Utc>,
    /// What happened to the row.
    #[serde(flatten)]
    pub kind: ChangeKind,
}

/// The three change kinds a feed delivers.
///
/// Pushed rows are bare table rows; joined display fields are never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeKind {
    /// A row was inserted.
    Insert { new: Record },
    /// A row was updated. `old` is only present when the backend sends it.
    Update {
        new: Record,
        #[serde(default)]
        old: Option<Record>,
    },
    /// A row was deleted. `old` may only hold the primary key.
    Delete { old: Record },
}

impl ChangeEvent {
    /// The identifier of the affected row.
    pub fn record_id(&self) -> Option<RecordId> {
        match &self.kind {
            ChangeKind::Insert { new } | ChangeKind::Update { new, .. } => new.id(),
            ChangeKind::Delete { old } => old.id(),
        }
    }

    /// Lowercase name of the change kind.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ChangeKind::Insert { .. } => "insert",
            ChangeKind::Update { .. } => "update",
            ChangeKind::Delete { .. } => "delete",
        }
    }
}

/// Which changes a feed should deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// The watched collection.
    pub collection: Collection,
    /// Optional parent filter (e.g. `category_id = X`).
    pub filter: Option<Filter>,
}

impl Subscription {
    /// Watch every row of a collection.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filter: None,
        }
    }

    /// Restrict to rows matching a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether an event belongs to this subscription.
    ///
    /// Deletes whose old row lacks the filter column are let through, since
    /// the backend may only send the primary key for them.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.collection != self.collection {
            return false;
        }

        let Some(filter) = &self.filter else {
            return true;
        };

        match &event.kind {
            ChangeKind::Insert { new } | ChangeKind::Update { new, .. } => filter.matches(new),
            ChangeKind::Delete { old } => {
                old.get(&filter.column).is_none() || filter.matches(old)
            }
        }
    }
}

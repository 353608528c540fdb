//! Mutations buffered while offline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, InvalidInputError};
use crate::types::{Collection, RecordId};

use super::{Filter, Record};

/// The kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Insert a new row.
    Create,
    /// Patch the row named by the payload's `id`.
    Update,
    /// Delete the row named by the payload's `id`.
    Delete,
}

impl ActionKind {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            other => Err(InvalidInputError::Other {
                message: format!("unknown action kind '{}'", other),
            }
            .into()),
        }
    }
}

/// A mutation recorded while offline, waiting to be replayed.
///
/// Actions replay in non-decreasing `enqueued_at` order. The `id` is local
/// bookkeeping for dequeueing; it is not sent to the backend, so a replay that
/// already committed remotely can be applied twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Local identifier of this queue entry.
    pub id: Uuid,
    /// The mutation kind.
    pub kind: ActionKind,
    /// Target collection.
    pub collection: Collection,
    /// Row payload (full row for create, patch for update, key for delete).
    pub payload: Record,
    /// When the mutation was attempted.
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// The error from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Create an action stamped with the current time.
    ///
    /// # Errors
    ///
    /// Update and delete payloads must carry an `id`.
    pub fn new(kind: ActionKind, collection: Collection, payload: Record) -> Result<Self, Error> {
        Self::new_at(kind, collection, payload, Utc::now())
    }

    /// Create an action with an explicit enqueue time.
    pub fn new_at(
        kind: ActionKind,
        collection: Collection,
        payload: Record,
        enqueued_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if kind != ActionKind::Create && payload.id().is_none() {
            return Err(InvalidInputError::Record {
                reason: format!("{} payload must contain an id", kind),
            }
            .into());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            collection,
            payload,
            enqueued_at,
            attempts: 0,
            last_error: None,
        })
    }

    /// The row targeted by an update or delete.
    pub fn target_id(&self) -> Option<RecordId> {
        self.payload.id()
    }

    /// Filter selecting the targeted row.
    pub fn target_filter(&self) -> Result<Filter, Error> {
        let id = self.target_id().ok_or_else(|| InvalidInputError::Record {
            reason: format!("{} payload must contain an id", self.kind),
        })?;
        Ok(Filter::id(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posts() -> Collection {
        Collection::new("posts").unwrap()
    }

    #[test]
    fn create_without_id_is_allowed() {
        let payload = Record::new(json!({"title": "Hi"})).unwrap();
        let action = QueuedAction::new(ActionKind::Create, posts(), payload).unwrap();
        assert_eq!(action.attempts, 0);
        assert!(action.target_id().is_none());
    }

    #[test]
    fn update_and_delete_require_id() {
        let payload = Record::new(json!({"title": "Hi"})).unwrap();
        assert!(QueuedAction::new(ActionKind::Update, posts(), payload.clone()).is_err());
        assert!(QueuedAction::new(ActionKind::Delete, posts(), payload).is_err());

        let keyed = Record::new(json!({"id": "p1"})).unwrap();
        let action = QueuedAction::new(ActionKind::Delete, posts(), keyed).unwrap();
        assert_eq!(action.target_filter().unwrap(), Filter::eq("id", "p1"));
    }

    #[test]
    fn kind_parses() {
        assert_eq!("update".parse::<ActionKind>().unwrap(), ActionKind::Update);
        assert!("upsert".parse::<ActionKind>().is_err());
    }

    #[test]
    fn persisted_form_defaults_bookkeeping() {
        let action: QueuedAction = serde_json::from_value(json!({
            "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "kind": "create",
            "collection": "listings",
            "payload": {"title": "Bike"},
            "enqueued_at": "2026-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(action.attempts, 0);
        assert!(action.last_error.is_none());
        assert_eq!(action.kind, ActionKind::Create);
    }
}

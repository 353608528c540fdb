//! Row payload type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, InvalidInputError};
use crate::types::RecordId;

/// A row payload: a JSON object of column values.
///
/// Construction rejects anything that is not a JSON object, so every
/// `Record` can be merged, filtered and keyed by its `id` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object.
    pub fn new(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(InvalidInputError::Record {
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }
            .into()),
        }
    }

    /// Create a record from an object map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// The row identifier, if the `id` column holds a string or integer.
    pub fn id(&self) -> Option<RecordId> {
        self.0.get("id").and_then(|v| RecordId::from_json(v).ok())
    }

    /// Whether this row's `id` column refers to `id`.
    pub fn has_id(&self, id: &RecordId) -> bool {
        self.0.get("id").is_some_and(|v| id.matches(v))
    }

    /// Get a column value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a column value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Shallow-merge another record's columns into this one.
    ///
    /// Columns present in `patch` overwrite ours; nested objects are replaced,
    /// not merged.
    pub fn merge(&mut self, patch: &Record) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Borrow the column map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume and return the JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Clone into a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_objects() {
        assert!(Record::new(json!([1, 2])).is_err());
        assert!(Record::new(json!(null)).is_err());
        assert!(Record::new(json!("post")).is_err());
        assert!(serde_json::from_str::<Record>("[1]").is_err());
    }

    #[test]
    fn reads_id() {
        let record = Record::new(json!({"id": "p1", "title": "Hello"})).unwrap();
        assert_eq!(record.id().unwrap().as_str(), "p1");

        let no_id = Record::new(json!({"title": "Hello"})).unwrap();
        assert!(no_id.id().is_none());
    }

    #[test]
    fn merge_is_shallow() {
        let mut record = Record::new(json!({
            "id": "p1",
            "title": "Old",
            "author": {"name": "ana", "avatar": "a.png"}
        }))
        .unwrap();
        let patch = Record::new(json!({"title": "New", "author": {"name": "bo"}})).unwrap();

        record.merge(&patch);

        assert_eq!(record.get("title").unwrap(), "New");
        assert_eq!(record.get("author").unwrap(), &json!({"name": "bo"}));
        assert_eq!(record.get("id").unwrap(), "p1");
    }
}

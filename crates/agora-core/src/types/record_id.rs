//! Row identifier type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, InvalidInputError};

/// Identifier of a row, as carried in its `id` column.
///
/// The backend uses uuid strings for most tables and integers for a few;
/// both are kept as their string form. Comparison is by that string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create an identifier from a non-empty string.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidInputError::RecordId {
                reason: "cannot be empty".to_string(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Read an identifier from a JSON value (string or integer).
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Self::new(s.as_str()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Self(n.to_string())),
            other => Err(InvalidInputError::RecordId {
                reason: format!("expected a string or integer, got {}", other),
            }
            .into()),
        }
    }

    /// Returns the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a JSON `id` value refers to this identifier.
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => s == &self.0,
            Value::Number(n) => n.to_string() == self.0,
            _ => false,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_string_and_integer() {
        let a = RecordId::from_json(&json!("8c1f")).unwrap();
        assert_eq!(a.as_str(), "8c1f");

        let b = RecordId::from_json(&json!(42)).unwrap();
        assert_eq!(b.as_str(), "42");
        assert!(b.matches(&json!(42)));
        assert!(b.matches(&json!("42")));
    }

    #[test]
    fn rejects_other_json() {
        assert!(RecordId::from_json(&json!(null)).is_err());
        assert!(RecordId::from_json(&json!(1.5)).is_err());
        assert!(RecordId::from_json(&json!({"id": 1})).is_err());
        assert!(RecordId::from_json(&json!("")).is_err());
    }
}

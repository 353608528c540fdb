//! Query description shared by every backend.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, InvalidInputError};
use crate::types::RecordId;

use super::Record;

/// An equality filter on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column name.
    pub column: String,
    /// Expected value.
    pub value: Value,
}

impl Filter {
    /// Filter rows whose `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Filter the row with the given identifier.
    pub fn id(id: &RecordId) -> Self {
        Self::eq("id", id.as_str())
    }

    /// Parse a `column=value` expression.
    ///
    /// The value is kept as a string; matching compares scalars by their
    /// string form, so `category_id=5` matches a numeric column.
    pub fn parse(expr: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| -> Error {
            InvalidInputError::Filter {
                value: expr.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        let (column, value) = expr.split_once('=').ok_or_else(|| invalid("expected column=value"))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(invalid("column cannot be empty"));
        }

        Ok(Self::eq(column, value.trim()))
    }

    /// Whether a row satisfies this filter.
    pub fn matches(&self, record: &Record) -> bool {
        record
            .get(&self.column)
            .is_some_and(|actual| scalar_eq(actual, &self.value))
    }

    /// The value as the backend's REST dialect expects it (`eq.<value>`).
    pub fn rest_value(&self) -> String {
        format!("eq.{}", scalar_string(&self.value))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, scalar_string(&self.value))
    }
}

/// Sort order on one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Column name.
    pub column: String,
    /// Sort descending when true.
    pub descending: bool,
}

impl Order {
    /// Parse `column` or `column.asc` / `column.desc`.
    pub fn parse(expr: &str) -> Result<Self, Error> {
        let (column, descending) = match expr.rsplit_once('.') {
            Some((column, "desc")) => (column, true),
            Some((column, "asc")) => (column, false),
            _ => (expr, false),
        };

        if column.is_empty() {
            return Err(InvalidInputError::Other {
                message: format!("invalid order expression '{}'", expr),
            }
            .into());
        }

        Ok(Self {
            column: column.to_string(),
            descending,
        })
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "desc" } else { "asc" };
        write!(f, "{}.{}", self.column, dir)
    }
}

/// A read against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Column expression, including embedded joins (`*,profiles(username)`).
    pub select: Option<String>,
    /// Equality filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Result ordering.
    pub order: Option<Order>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl Query {
    /// An unfiltered query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the column expression.
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// Add an equality filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Order by a column.
    pub fn order(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stable cache key for this query.
    pub fn signature(&self) -> String {
        let mut parts = Vec::new();
        if let Some(select) = &self.select {
            parts.push(format!("select={}", select));
        }
        for filter in &self.filters {
            parts.push(filter.to_string());
        }
        if let Some(order) = &self.order {
            parts.push(format!("order={}", order));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        parts.join("&")
    }

    /// Whether a row passes every filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Evaluate filters, order and limit over in-memory rows.
    pub fn apply(&self, rows: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut rows: Vec<Record> = rows.into_iter().filter(|r| self.matches(r)).collect();

        if let Some(order) = &self.order {
            rows.sort_by(|a, b| {
                let ord = compare_json(a.get(&order.column), b.get(&order.column));
                if order.descending { ord.reverse() } else { ord }
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        rows
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(_), Value::Number(_) | Value::Bool(_))
        | (Value::Number(_) | Value::Bool(_), Value::String(_)) => {
            scalar_string(actual) == scalar_string(expected)
        }
        _ => false,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON column values: nulls first, then by type, then by value.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

//! Entity identifier types.
//!
//! Entities are identified by a map of id column names to scalar values. Most
//! tables have a single `id` column, but composite keys are supported as well.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single scalar component of an entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    /// Integer key (serial / bigint columns).
    Int(i64),
    /// Textual key (uuid, slug, varchar columns).
    Text(String),
}

impl IdValue {
    /// Convert a JSON scalar into an id value.
    ///
    /// Returns `None` for anything that is not an integer or a string.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(IdValue::Int),
            Value::String(s) => Some(IdValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Convert the id value back to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            IdValue::Int(n) => Value::from(*n),
            IdValue::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Int(n) => write!(f, "{}", n),
            IdValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        IdValue::Int(value)
    }
}

impl From<i32> for IdValue {
    fn from(value: i32) -> Self {
        IdValue::Int(value.into())
    }
}

impl From<&str> for IdValue {
    fn from(value: &str) -> Self {
        IdValue::Text(value.to_string())
    }
}

impl From<String> for IdValue {
    fn from(value: String) -> Self {
        IdValue::Text(value)
    }
}

/// Identifier map of an entity, keyed by id column name.
///
/// A `BTreeMap` keeps the key order stable so that document ids derived from
/// it are deterministic.
pub type EntityIds = BTreeMap<String, IdValue>;

/// Build an identifier map with a single column.
///
/// # Example
///
/// ```
/// use search_sync_shared::{single_id, IdValue};
///
/// let ids = single_id("id", 42);
/// assert_eq!(ids.get("id"), Some(&IdValue::Int(42)));
/// ```
pub fn single_id(column: impl Into<String>, value: impl Into<IdValue>) -> EntityIds {
    let mut ids = EntityIds::new();
    ids.insert(column.into(), value.into());
    ids
}

/// Generate the document ID used in the search index.
///
/// Uses the id values joined by `_` in column order, so a single-column key
/// `{id: 1}` becomes `"1"` and a composite key `{blog_id: 1, id: 7}` becomes
/// `"1_7"`.
pub fn document_id(ids: &EntityIds) -> String {
    ids.values()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("_")
}

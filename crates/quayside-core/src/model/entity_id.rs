// ── Record identity ──
//
// The backend identifies records with integers, but events and cached
// payloads do not always agree on the JSON type (`7` vs `"7"`). `EntityId`
// keeps whatever was sent and compares by numeric identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier carried by an event or a cached record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl EntityId {
    /// Read an id from a JSON value. Accepts integers and non-empty strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Numeric identity: the integer itself, or a string that parses as one.
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Numeric identity of a cached record's `id` field, if it has one.
pub(crate) fn record_numeric_id(record: &serde_json::Map<String, Value>) -> Option<i64> {
    record
        .get("id")
        .and_then(EntityId::from_json)
        .and_then(|id| id.as_numeric())
}

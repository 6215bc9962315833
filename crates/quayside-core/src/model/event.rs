// ── Canonical push event ──
//
// Every inbound message, whatever shape the server used, is shaped into an
// `Event` by `normalize()` before any subscriber sees it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use strum::{Display, EnumString};

use super::entity_id::EntityId;

/// Type given to messages that cannot be classified.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// Well-known event actions. Anything else stays an opaque string on
/// [`Event::action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    Deleted,
    Ping,
    Bulk,
}

/// One normalized notification about a server-side change.
///
/// `kind` (serialized as `type`) is never empty. The remaining fields pass
/// through from the wire when they had a usable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Canonical dotted name, `"<resource>.<action>"`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Single affected record; absent for collection-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    /// Server timestamp, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,

    /// Payload version, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<Number>,

    /// Field-level delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Map<String, Value>>,

    /// Replacement fields, applied after `changes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    /// Raw nested events of a bulk envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Value>>,
}

impl Event {
    /// The sentinel event for unclassifiable input.
    pub fn unknown() -> Self {
        Self::named(UNKNOWN_EVENT_TYPE)
    }

    /// An event with only its type set.
    pub fn named(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            resource: None,
            action: None,
            id: None,
            ts: None,
            v: None,
            changes: None,
            data: None,
            events: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == UNKNOWN_EVENT_TYPE
    }

    /// Explicit `resource`, else the part of `type` before its last dot.
    pub fn resource_name(&self) -> Option<&str> {
        self.resource
            .as_deref()
            .or_else(|| self.kind.rsplit_once('.').map(|(resource, _)| resource))
    }

    /// Explicit `action`, else the part of `type` after its last dot.
    pub fn action_name(&self) -> Option<&str> {
        self.action
            .as_deref()
            .or_else(|| self.kind.rsplit_once('.').map(|(_, action)| action))
    }

    /// The action as a well-known [`Action`], if it is one.
    pub fn action_kind(&self) -> Option<Action> {
        self.action_name().and_then(|a| a.parse().ok())
    }

    /// Numeric identity of [`id`](Self::id), if any.
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.as_ref().and_then(EntityId::as_numeric)
    }
}

// ── Normalization ────────────────────────────────────────────────────

/// Shape a raw decoded message into an [`Event`].
///
/// Total and deterministic: non-objects and objects with neither a `type`
/// nor a `resource` + `action` pair become [`Event::unknown`]. Individual
/// fields with the wrong JSON shape are dropped rather than failing the
/// whole message.
pub fn normalize(raw: &Value) -> Event {
    let Some(obj) = raw.as_object() else {
        return Event::unknown();
    };

    let resource = non_empty_str(obj, "resource");
    let action = non_empty_str(obj, "action");

    let kind = match (non_empty_str(obj, "type"), &resource, &action) {
        (Some(kind), _, _) => kind,
        (None, Some(resource), Some(action)) => format!("{resource}.{action}"),
        _ => return Event::unknown(),
    };

    Event {
        kind,
        resource,
        action,
        id: obj.get("id").and_then(EntityId::from_json),
        ts: non_empty_str(obj, "ts"),
        v: match obj.get("v") {
            Some(Value::Number(n)) => Some(n.clone()),
            _ => None,
        },
        changes: object_field(obj, "changes"),
        data: object_field(obj, "data"),
        events: obj.get("events").and_then(Value::as_array).cloned(),
    }
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn object_field(obj: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    obj.get(key).and_then(Value::as_object).cloned()
}

// ── Tests ────────────────────────────────────────────────────────────

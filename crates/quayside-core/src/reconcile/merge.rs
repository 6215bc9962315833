// Pure patch helpers. Each returns `None` when the cached value does not
// contain the record, so untouched entries are never rewritten.

use serde_json::{Map, Value};

use crate::model::Event;
use crate::model::entity_id::record_numeric_id;

/// Keys under which an object-shaped collection may hold its items.
const COLLECTION_FIELDS: [&str; 3] = ["items", "data", "results"];

/// Shallow merge: `changes` first, then `data`.
pub(crate) fn merge_record(record: &Map<String, Value>, event: &Event) -> Map<String, Value> {
    let mut merged = record.clone();
    for delta in [&event.changes, &event.data].into_iter().flatten() {
        for (field, value) in delta {
            merged.insert(field.clone(), value.clone());
        }
    }
    merged
}

/// Patch the item with numeric identity `id` inside a cached collection.
///
/// Understands a top-level array or an object holding the array under
/// `items`, `data` or `results`. Length and order are preserved.
pub(crate) fn patch_collection(cached: &Value, id: i64, event: &Event) -> Option<Value> {
    match cached {
        Value::Array(items) => patch_items(items, id, event).map(Value::Array),
        Value::Object(obj) => {
            let (field, items) = COLLECTION_FIELDS
                .iter()
                .find_map(|f| obj.get(*f).and_then(Value::as_array).map(|items| (*f, items)))?;
            let patched = patch_items(items, id, event)?;
            let mut obj = obj.clone();
            obj.insert(field.to_owned(), Value::Array(patched));
            Some(Value::Object(obj))
        }
        _ => None,
    }
}

fn patch_items(items: &[Value], id: i64, event: &Event) -> Option<Vec<Value>> {
    let mut matched = false;
    let patched = items
        .iter()
        .map(|item| match item {
            Value::Object(record) if record_numeric_id(record) == Some(id) => {
                matched = true;
                Value::Object(merge_record(record, event))
            }
            other => other.clone(),
        })
        .collect();
    matched.then_some(patched)
}

/// Patch a cached single-record entry. A record whose own `id` names a
/// different entity is left alone.
pub(crate) fn patch_detail(cached: &Value, id: i64, event: &Event) -> Option<Value> {
    let record = cached.as_object()?;
    if record.contains_key("id") && record_numeric_id(record) != Some(id) {
        return None;
    }
    Some(Value::Object(merge_record(record, event)))
}

// ── Domain model ──
//
// Push events and the identities they refer to.

pub mod entity_id;
pub mod event;

pub use entity_id::EntityId;
pub use event::{Action, Event, UNKNOWN_EVENT_TYPE, normalize};

//! Real-time synchronization engine between `quayside-api` and UI consumers.
//!
//! - **[`RealtimeClient`]**: keeps one push connection alive through an
//!   injected [`Transport`](quayside_api::Transport), reconnecting with
//!   jittered exponential [`Backoff`], sending keepalive pings, and fanning
//!   every normalized [`Event`] out to subscribers in arrival order.
//!
//! - **[`normalize`]**: total, pure mapping from any decoded wire message to
//!   the canonical [`Event`] shape.
//!
//! - **[`Reconciler`]**: a subscriber that patches cached records in place
//!   or marks result sets stale, driven by a data-driven [`RuleTable`].
//!
//! - **[`QueryStore`]**: in-process [`QueryCache`] (`DashMap` +
//!   `tokio::sync::watch`) with stale-aware [`fetch_with`](QueryStore::fetch_with).
//!
//! - **[`CredentialProvider`]**: where the bearer token for the next
//!   connection attempt comes from.

pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod realtime;
pub mod reconcile;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{RealtimeConfig, redact_endpoint};
pub use credentials::{CredentialProvider, EnvToken, NoCredentials, StaticToken};
pub use error::CoreError;
pub use model::{Action, EntityId, Event, UNKNOWN_EVENT_TYPE, normalize};
pub use realtime::{Backoff, ConnectionState, RealtimeClient, Subscription};
pub use reconcile::{Reconciler, Reconciliation, ResourceRule, RuleTable};
pub use store::{CacheRead, QueryCache, QueryKey, QueryStore};

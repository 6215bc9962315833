// Push connection management: one long-lived connection, reconnect backoff,
// keepalive, and synchronous subscriber fan-out.

mod backoff;
mod client;
mod subscribers;

pub use backoff::{Backoff, MAX_JITTER, MAX_RETRY_COUNT, random_jitter};
pub use client::{ConnectionState, RealtimeClient};
pub use subscribers::Subscription;

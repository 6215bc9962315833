// ── Query cache ──
//
// The reconciler sees the cache only through `QueryCache`. `QueryStore` is
// the in-process implementation used by the CLI and by tests; an embedding
// application can put its own cache behind the trait instead.

mod query_key;
mod query_store;

use serde_json::Value;

pub use query_key::QueryKey;
pub use query_store::{CacheRead, QueryStore};

/// Cache operations the reconciler needs.
pub trait QueryCache: Send + Sync {
    /// Offer every entry whose key starts with `prefix` to `merge`, and
    /// atomically replace the value of each entry it returns `Some` for.
    ///
    /// Returns the number of entries replaced. `merge` must not call back
    /// into the cache.
    fn patch(&self, prefix: &QueryKey, merge: &mut dyn FnMut(&Value) -> Option<Value>) -> usize;

    /// Mark every entry under `prefix` stale so its next read refetches.
    /// Returns the number of entries newly marked.
    fn invalidate(&self, prefix: &QueryKey) -> usize;
}

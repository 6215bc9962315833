// ── In-process query cache ──
//
// Concurrent storage of server-derived query results with push-based change
// notification via a `watch` version counter. Values are swapped as whole
// `Arc<Value>`s, so readers never observe a half-applied patch.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::watch;

use super::QueryCache;
use super::query_key::QueryKey;

struct CachedQuery {
    data: Arc<Value>,
    /// Set by invalidation; cleared when the entry is seeded again.
    stale: bool,
    /// Bumped on every write. A refetch that started under an older
    /// generation cannot mark the entry fresh.
    generation: u64,
}

/// Where a write comes from.
#[derive(Clone, Copy)]
enum WriteOrigin {
    Seed,
    /// A refetch that started at this generation (`None` if the entry was missing).
    Refetch(Option<u64>),
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    Fresh(Arc<Value>),
    /// Still readable, but the next fetch should go to the server.
    Stale(Arc<Value>),
    Missing,
}

impl CacheRead {
    /// The cached value regardless of freshness.
    pub fn value(&self) -> Option<&Arc<Value>> {
        match self {
            Self::Fresh(v) | Self::Stale(v) => Some(v),
            Self::Missing => None,
        }
    }
}

/// Thread-safe query cache keyed by [`QueryKey`].
pub struct QueryStore {
    entries: DashMap<QueryKey, CachedQuery>,
    /// Bumped on every mutation.
    version: watch::Sender<u64>,
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            entries: DashMap::new(),
            version,
        }
    }

    /// Store a fresh result for `key`, replacing whatever was there.
    pub fn seed(&self, key: QueryKey, data: Value) -> Arc<Value> {
        self.write(key, data, WriteOrigin::Seed)
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.entries.get(key).map(|e| Arc::clone(&e.data))
    }

    pub fn read(&self, key: &QueryKey) -> CacheRead {
        match self.entries.get(key) {
            Some(e) if e.stale => CacheRead::Stale(Arc::clone(&e.data)),
            Some(e) => CacheRead::Fresh(Arc::clone(&e.data)),
            None => CacheRead::Missing,
        }
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.stale)
    }

    /// Return the cached value if fresh; otherwise run `fetch` and store its
    /// result.
    ///
    /// If the entry was patched or invalidated while `fetch` was in flight,
    /// the result is stored but stays stale, so the next call fetches again.
    /// A failed fetch leaves the entry as it was (stale or missing).
    pub async fn fetch_with<F, Fut, E>(&self, key: &QueryKey, fetch: F) -> Result<Arc<Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let started_at = match self.entries.get(key) {
            Some(e) if !e.stale => return Ok(Arc::clone(&e.data)),
            Some(e) => Some(e.generation),
            None => None,
        };
        tracing::debug!(key = %key, "refetching query");
        let data = fetch().await?;
        Ok(self.write(key.clone(), data, WriteOrigin::Refetch(started_at)))
    }

    pub fn remove(&self, key: &QueryKey) -> Option<Arc<Value>> {
        let removed = self.entries.remove(key).map(|(_, e)| e.data);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.bump_version();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribe to the mutation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Replace the value at `key`. A refetched value is only fresh if nothing
    /// else wrote the entry since the fetch started.
    fn write(&self, key: QueryKey, data: Value, origin: WriteOrigin) -> Arc<Value> {
        let data = Arc::new(data);
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().generation;
                let superseded = match origin {
                    WriteOrigin::Seed => false,
                    WriteOrigin::Refetch(seen) => seen != Some(current),
                };
                if superseded {
                    tracing::debug!(key = %slot.key(), "entry changed during refetch; keeping it stale");
                }
                let entry = slot.get_mut();
                entry.data = Arc::clone(&data);
                entry.stale = superseded;
                entry.generation += 1;
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedQuery {
                    data: Arc::clone(&data),
                    stale: false,
                    generation: 0,
                });
            }
        }
        self.bump_version();
        data
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}

impl QueryCache for QueryStore {
    fn patch(&self, prefix: &QueryKey, merge: &mut dyn FnMut(&Value) -> Option<Value>) -> usize {
        let mut patched = 0;
        for mut entry in self.entries.iter_mut() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            if let Some(next) = merge(&entry.data) {
                entry.data = Arc::new(next);
                entry.generation += 1;
                patched += 1;
            }
        }
        if patched > 0 {
            self.bump_version();
        }
        patched
    }

    fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut marked = 0;
        for mut entry in self.entries.iter_mut() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            // Already stale entries still record the change for in-flight refetches.
            entry.generation += 1;
            if !entry.stale {
                entry.stale = true;
                marked += 1;
            }
        }
        if marked > 0 {
            self.bump_version();
        }
        marked
    }
}

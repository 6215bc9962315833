// ── Cache reconciler ──
//
// Turns normalized events into cache mutations: precise in-place patches for
// updates of a known record, stale marks for anything that changes the shape
// of a result set. Patches only touch records already in the cache.

mod merge;
mod rules;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::model::{Action, Event};
use crate::realtime::{RealtimeClient, Subscription};
use crate::store::{QueryCache, QueryKey};

pub use rules::{ResourceRule, RuleTable};

/// What [`Reconciler::apply`] did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Records were merged in place in this many entries.
    Patched { entries: usize },
    /// This many entries were newly marked stale.
    Invalidated { entries: usize },
    /// Unknown resource or action; the cache was not touched.
    Ignored,
}

/// Applies push events to a [`QueryCache`].
#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<dyn QueryCache>,
    rules: Arc<RuleTable>,
}

impl Reconciler {
    pub fn new(cache: Arc<dyn QueryCache>, rules: RuleTable) -> Self {
        Self {
            cache,
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Subscribe to `client` and apply every event it delivers.
    pub fn attach(&self, client: &RealtimeClient) -> Subscription {
        let reconciler = self.clone();
        client.subscribe(move |event| {
            let outcome = reconciler.apply(event);
            if outcome != Reconciliation::Ignored {
                debug!(event_type = %event.kind, ?outcome, "reconciled push event");
            }
        })
    }

    /// Apply one event to the cache.
    pub fn apply(&self, event: &Event) -> Reconciliation {
        let Some(rule) = event.resource_name().and_then(|r| self.rules.get(r)) else {
            return Reconciliation::Ignored;
        };

        match event.action_kind() {
            Some(Action::Updated) => match &event.id {
                Some(id) => self.patch(rule, id.as_numeric(), event),
                // Cannot locate the record; fall back to coarse invalidation.
                None => self.invalidate(rule.collections.iter()),
            },
            Some(Action::Created) => {
                self.invalidate(rule.collections.iter().chain(&rule.aggregates))
            }
            Some(Action::Deleted) => {
                let detail = event.numeric_id().map(|id| rule.detail_key(id));
                self.invalidate(
                    rule.collections
                        .iter()
                        .chain(&rule.aggregates)
                        .chain(detail.as_ref()),
                )
            }
            _ => Reconciliation::Ignored,
        }
    }

    fn patch(&self, rule: &ResourceRule, id: Option<i64>, event: &Event) -> Reconciliation {
        // Non-numeric ids match nothing.
        let Some(id) = id else {
            return Reconciliation::Patched { entries: 0 };
        };

        let mut entries = 0;
        for prefix in &rule.collections {
            entries += self
                .cache
                .patch(prefix, &mut |cached: &Value| merge::patch_collection(cached, id, event));
        }
        entries += self
            .cache
            .patch(&rule.detail_key(id), &mut |cached: &Value| merge::patch_detail(cached, id, event));

        Reconciliation::Patched { entries }
    }

    fn invalidate<'a>(&self, prefixes: impl Iterator<Item = &'a QueryKey>) -> Reconciliation {
        let entries = prefixes.map(|prefix| self.cache.invalidate(prefix)).sum();
        Reconciliation::Invalidated { entries }
    }
}

// ── Subscriber registry ──
//
// Insertion-ordered callbacks with synchronous fan-out. The list lock is
// never held while a callback runs, so callbacks may subscribe, unsubscribe
// (themselves or others) or publish without deadlocking.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::model::Event;

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

#[derive(Clone, Default)]
pub(crate) struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.inner.lock().push(Entry {
            id,
            active: Arc::clone(&active),
            callback: Arc::new(callback),
        });
        Subscription {
            id,
            active,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every live subscriber in registration order.
    ///
    /// A subscriber removed during this fan-out is skipped if it has not been
    /// reached yet. A panicking subscriber is logged and skipped. Returns the
    /// number of callbacks that completed.
    pub(crate) fn publish(&self, event: &Event) -> usize {
        let snapshot: Vec<(Arc<AtomicBool>, Callback)> = self
            .inner
            .lock()
            .iter()
            .map(|e| (Arc::clone(&e.active), Arc::clone(&e.callback)))
            .collect();

        let mut delivered = 0;
        for (active, callback) in snapshot {
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(event_type = %event.kind, "subscriber panicked; continuing fan-out");
                }
            }
        }
        delivered
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl RegistryInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Subscription handle ──────────────────────────────────────────────

/// Capability to remove one registered callback.
///
/// Dropping the handle does **not** unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). Calling it more than once, or from
/// inside the callback itself, is fine.
#[must_use = "dropping a Subscription leaves the callback registered"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Remove the callback. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|e| e.id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Event) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |name: &str| -> Box<dyn Fn(&Event) + Send + Sync> {
                let log = Arc::clone(&log);
                let name = name.to_owned();
                Box::new(move |e: &Event| log.lock().unwrap().push(format!("{name}:{}", e.kind)))
            }
        };
        (log, make)
    }

    #[test]
    fn delivers_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();
        let _a = registry.subscribe(make("a"));
        let _b = registry.subscribe(make("b"));
        let _c = registry.subscribe(make("c"));

        assert_eq!(registry.publish(&Event::named("arrivals.created")), 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:arrivals.created", "b:arrivals.created", "c:arrivals.created"]
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();
        let a = registry.subscribe(make("a"));
        let _b = registry.subscribe(make("b"));

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(registry.len(), 1);

        registry.publish(&Event::named("x.y"));
        assert_eq!(*log.lock().unwrap(), vec!["b:x.y"]);
    }

    #[test]
    fn unsubscribing_self_during_fan_out_is_safe() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let own: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let handle = {
            let own = Arc::clone(&own);
            let log = Arc::clone(&log);
            registry.subscribe(move |e: &Event| {
                log.lock().unwrap().push(format!("self:{}", e.kind));
                if let Some(sub) = own.get() {
                    sub.unsubscribe();
                }
            })
        };
        own.set(handle).unwrap();
        let _after = registry.subscribe(make("after"));

        registry.publish(&Event::named("first"));
        registry.publish(&Event::named("second"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["self:first", "after:first", "after:second"]
        );
    }

    #[test]
    fn subscriber_removed_mid_fan_out_is_skipped() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let victim: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let _killer = {
            let victim = Arc::clone(&victim);
            registry.subscribe(move |_: &Event| {
                if let Some(sub) = victim.get() {
                    sub.unsubscribe();
                }
            })
        };
        victim.set(registry.subscribe(make("victim"))).unwrap();

        assert_eq!(registry.publish(&Event::named("e")), 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();
        let _bad = registry.subscribe(|_: &Event| panic!("boom"));
        let _good = registry.subscribe(make("good"));

        assert_eq!(registry.publish(&Event::named("e")), 1);
        assert_eq!(*log.lock().unwrap(), vec!["good:e"]);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_noop() {
        let registry = SubscriberRegistry::new();
        let sub = registry.subscribe(|_: &Event| {});
        drop(registry);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}

// ── Realtime connection manager ──
//
// Keeps one logical push connection alive, retries with jittered backoff,
// and fans every normalized event out to subscribers in arrival order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quayside_api::{KeepalivePing, Transport, TransportEvent, wire};
use secrecy::SecretString;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::subscribers::{SubscriberRegistry, Subscription};
use crate::config::{RealtimeConfig, redact_endpoint};
use crate::credentials::CredentialProvider;
use crate::error::CoreError;
use crate::model::{Event, normalize};

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── RealtimeClient ───────────────────────────────────────────────────

/// Live push-event client.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Create one per application and
/// hand clones to whatever needs to subscribe. Background tasks hold only
/// weak references, so dropping the last clone tears everything down.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RealtimeConfig,
    backoff: Backoff,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    subscribers: SubscriberRegistry,
    state: watch::Sender<ConnectionState>,
    last_event: watch::Sender<Option<DateTime<Utc>>>,
    link: Mutex<Link>,
}

/// Mutable lifecycle state, guarded by one lock so that state checks and
/// timer bookkeeping happen atomically.
#[derive(Default)]
struct Link {
    retry_count: u32,
    /// Bumped by `shutdown()`. A retry timer armed under an older epoch
    /// does nothing when it fires.
    epoch: u64,
    /// Cancels the event pump (and keepalive) of the current attempt.
    connection: Option<CancellationToken>,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_event, _) = watch::channel(None);

        Self {
            inner: Arc::new(ClientInner {
                backoff: config.backoff(),
                config,
                transport,
                credentials,
                subscribers: SubscriberRegistry::new(),
                state,
                last_event,
                link: Mutex::new(Link::default()),
            }),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the push connection if it is not already open, opening, or
    /// waiting on a scheduled retry.
    ///
    /// Must be called from within a Tokio runtime. Never fails: any problem
    /// building or opening the connection schedules a retry.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Tear down the connection, keepalive and any pending retry.
    ///
    /// The client returns to [`ConnectionState::Disconnected`] with a fresh
    /// retry counter; a later [`start`](Self::start) connects again, e.g.
    /// after re-authentication.
    pub fn shutdown(&self) {
        {
            let mut link = self.inner.lock_link();
            link.teardown();
            link.epoch = link.epoch.wrapping_add(1);
            link.retry_count = 0;
            self.inner.state.send_replace(ConnectionState::Disconnected);
            // Under the lock, so no attempt can open between teardown and close.
            self.inner.transport.close();
        }
        info!("push channel shut down");
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register a callback for every normalized event.
    ///
    /// Callbacks run synchronously on the event pump, in registration order,
    /// and should return quickly.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Current retry counter (resets to zero on every successful open).
    pub fn retry_count(&self) -> u32 {
        self.inner.lock_link().retry_count
    }

    /// Whether a reconnect timer is currently pending.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.lock_link().reconnect.is_some()
    }

    /// When the last event was delivered, or `None` if none yet.
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_event.borrow()
    }
}

// ── Connection lifecycle ─────────────────────────────────────────────

impl ClientInner {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!("start() called outside a Tokio runtime; ignoring");
            return;
        };
        if !self.can_start(&self.lock_link()) {
            return;
        }

        // Providers may block (keyring) or call back into the client, so the
        // token is resolved without holding the lock.
        let token = self.credentials.bearer_token();
        let mut link = self.lock_link();
        if self.can_start(&link) {
            self.connect(&runtime, &mut link, token);
        }
    }

    /// Body of a fired retry timer armed under `epoch`.
    fn retry(self: &Arc<Self>, runtime: &Handle, epoch: u64) {
        let token = self.credentials.bearer_token();
        let mut link = self.lock_link();
        if link.epoch != epoch {
            debug!("reconnect cancelled by shutdown");
            return;
        }
        link.reconnect = None;
        if self.can_start(&link) {
            self.connect(runtime, &mut link, token);
        }
    }

    fn can_start(&self, link: &Link) -> bool {
        if link.reconnect.is_some() {
            debug!("reconnect already scheduled; start ignored");
            return false;
        }
        let state = *self.state.borrow();
        if state != ConnectionState::Disconnected {
            debug!(%state, "already active; start ignored");
            return false;
        }
        true
    }

    fn connect(self: &Arc<Self>, runtime: &Handle, link: &mut Link, token: Option<SecretString>) {
        self.state.send_replace(ConnectionState::Connecting);

        let url = match self.config.endpoint(token.as_ref()) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build push endpoint");
                self.fail_attempt(link);
                return;
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.transport.open(&url, events_tx) {
            let e = CoreError::from(e);
            warn!(error = %e, url = %redact_endpoint(&url), "cannot open push channel");
            self.fail_attempt(link);
            return;
        }

        info!(
            url = %redact_endpoint(&url),
            authenticated = token.is_some(),
            "connecting push channel"
        );
        let cancel = CancellationToken::new();
        link.connection = Some(cancel.clone());
        runtime.spawn(pump(Arc::downgrade(self), events_rx, cancel));
    }

    fn fail_attempt(self: &Arc<Self>, link: &mut Link) {
        self.state.send_replace(ConnectionState::Disconnected);
        self.schedule_reconnect(link);
    }

    /// Arm the retry timer unless one is already pending.
    fn schedule_reconnect(self: &Arc<Self>, link: &mut Link) {
        if link.reconnect.is_some() {
            return;
        }

        let attempt = link.retry_count;
        let delay = self.backoff.next_delay(attempt);
        link.retry_count = Backoff::next_retry_count(attempt);

        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "scheduling reconnect"
        );

        let weak = Arc::downgrade(self);
        let epoch = link.epoch;
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.retry(&Handle::current(), epoch);
            }
        }));
    }

    // ── Transport event handlers ─────────────────────────────────────

    /// Handle one transport event. Returns `false` once the connection is over.
    fn dispatch(self: &Arc<Self>, event: Option<TransportEvent>, cancel: &CancellationToken) -> bool {
        match event {
            Some(TransportEvent::Open) => {
                self.on_open(cancel);
                true
            }
            Some(TransportEvent::Message(text)) => {
                self.on_message(&text);
                true
            }
            Some(TransportEvent::Error(error)) => {
                warn!(%error, "push channel error");
                true
            }
            Some(TransportEvent::Close { code, reason }) => {
                self.on_close(code, &reason, cancel);
                false
            }
            None => {
                self.on_close(None, "transport dropped event channel", cancel);
                false
            }
        }
    }

    fn on_open(self: &Arc<Self>, cancel: &CancellationToken) {
        let mut link = self.lock_link();
        if cancel.is_cancelled() {
            return;
        }
        link.retry_count = 0;
        self.state.send_replace(ConnectionState::Connected);

        if let Some(previous) = link.keepalive.take() {
            previous.abort();
        }
        link.keepalive = Some(tokio::spawn(keepalive(
            Arc::downgrade(self),
            self.config.keepalive_interval,
            cancel.clone(),
        )));
        info!("push channel connected");
    }

    fn on_message(&self, text: &str) {
        let raw = match wire::decode(text) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %CoreError::from(e), "dropping undecodable push payload");
                return;
            }
        };

        match bulk_events(&raw) {
            Some(events) => {
                debug!(count = events.len(), "expanding bulk envelope");
                for nested in events {
                    self.publish(&normalize(nested));
                }
            }
            None => self.publish(&normalize(&raw)),
        }
    }

    fn publish(&self, event: &Event) {
        self.last_event.send_replace(Some(Utc::now()));
        self.subscribers.publish(event);
    }

    fn on_close(self: &Arc<Self>, code: Option<u16>, reason: &str, cancel: &CancellationToken) {
        let mut link = self.lock_link();
        if cancel.is_cancelled() {
            // Superseded by shutdown(); nothing to reconnect.
            return;
        }
        cancel.cancel();
        link.connection = None;
        if let Some(keepalive) = link.keepalive.take() {
            keepalive.abort();
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!(?code, reason, "push channel closed");
        self.schedule_reconnect(&mut link);
    }

    fn send_ping(&self) {
        let sent = KeepalivePing::now()
            .encode()
            .and_then(|text| self.transport.send(text));
        if let Err(e) = sent {
            debug!(error = %e, "keepalive ping failed");
        }
    }
}

impl Link {
    fn teardown(&mut self) {
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.abort();
        }
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.cancel();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .teardown();
        self.transport.close();
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Drain transport events for one connection attempt, one at a time.
async fn pump(
    inner: Weak<ClientInner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(inner) = inner.upgrade() else { break };
        if !inner.dispatch(event, &cancel) {
            break;
        }
    }
}

/// Send `system.ping` every `interval` until the connection is cancelled.
async fn keepalive(inner: Weak<ClientInner>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else { break };
        inner.send_ping();
    }
}

// ── Bulk envelopes ───────────────────────────────────────────────────

/// Nested events of a bulk envelope, or `None` for a single message.
///
/// An envelope is an object with an `events` array whose `type` is `"bulk"`
/// or ends in `".bulk"`, or whose `action` is `"bulk"`.
fn bulk_events(raw: &Value) -> Option<&Vec<Value>> {
    let obj = raw.as_object()?;
    let events = obj.get("events")?.as_array()?;
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
    let action = obj.get("action").and_then(Value::as_str).unwrap_or_default();
    let is_bulk = kind == "bulk" || kind.ends_with(".bulk") || action == "bulk";
    is_bulk.then_some(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bulk_markers_are_recognized() {
        let events = json!([{"type": "a.created"}]);
        for raw in [
            json!({"type": "bulk", "events": events}),
            json!({"type": "system.bulk", "events": events}),
            json!({"resource": "system", "action": "bulk", "events": events}),
        ] {
            assert_eq!(bulk_events(&raw).map(Vec::len), Some(1), "{raw}");
        }
    }

    #[test]
    fn events_without_bulk_marker_are_single_messages() {
        assert!(bulk_events(&json!({"type": "arrivals.updated", "events": []})).is_none());
        assert!(bulk_events(&json!({"type": "bulk", "events": "nope"})).is_none());
        assert!(bulk_events(&json!([1, 2])).is_none());
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}

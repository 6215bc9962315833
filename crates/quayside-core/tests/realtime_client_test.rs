#![allow(clippy::unwrap_used)]

// Connection-manager behaviour against a scripted transport, on Tokio's
// paused clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use pretty_assertions::assert_eq;
use quayside_api::{Error, Transport, TransportEvent};
use quayside_core::{
    ConnectionState, CredentialProvider, Event, NoCredentials, RealtimeClient, RealtimeConfig,
    StaticToken,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

// ── Fake transport ──────────────────────────────────────────────────

#[derive(Default)]
struct FakeTransport {
    opened: Mutex<Vec<Url>>,
    sent: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    closes: AtomicUsize,
    refuse_open: AtomicBool,
}

impl FakeTransport {
    fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    fn last_url(&self) -> Url {
        self.opened.lock().unwrap().last().cloned().unwrap()
    }

    fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// Deliver an event on the most recent connection.
    fn emit(&self, event: TransportEvent) {
        let events = self.events.lock().unwrap();
        events.as_ref().unwrap().send(event).unwrap();
    }

    fn message(&self, value: &Value) {
        self.emit(TransportEvent::Message(value.to_string()));
    }

    fn drop_connection(&self) {
        self.emit(TransportEvent::Close {
            code: Some(1006),
            reason: "abnormal closure".into(),
        });
    }
}

impl Transport for FakeTransport {
    fn open(&self, url: &Url, events: mpsc::UnboundedSender<TransportEvent>) -> Result<(), Error> {
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(Error::WebSocketConnect("refused".into()));
        }
        self.opened.lock().unwrap().push(url.clone());
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    fn send(&self, text: String) -> Result<(), Error> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().take();
    }
}

// ── Harness ─────────────────────────────────────────────────────────

fn client_with(
    config: RealtimeConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> (RealtimeClient, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::default());
    let client = RealtimeClient::new(config, transport.clone(), credentials);
    (client, transport)
}

fn client() -> (RealtimeClient, Arc<FakeTransport>) {
    client_with(RealtimeConfig::default(), Arc::new(NoCredentials))
}

/// Let spawned tasks drain their queues without moving the clock.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

fn record(client: &RealtimeClient) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = client.subscribe(move |e: &Event| sink.lock().unwrap().push(e.clone()));
    seen
}

async fn connected() -> (RealtimeClient, Arc<FakeTransport>) {
    let (client, transport) = client();
    client.start();
    transport.emit(TransportEvent::Open);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Connected);
    (client, transport)
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn repeated_start_opens_once() {
    let (client, transport) = client();

    client.start();
    client.start();
    client.start();
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(), ConnectionState::Connecting);

    transport.emit(TransportEvent::Open);
    settle().await;
    client.start();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn endpoint_carries_version_topics_and_token() {
    let token = StaticToken::new(SecretString::from("abc123".to_owned()));
    let (client, transport) = client_with(RealtimeConfig::default(), Arc::new(token));
    client.start();

    let url = transport.last_url();
    assert_eq!(url.scheme(), "ws");
    assert_eq!(url.path(), "/ws");
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        query,
        vec![
            ("v".to_owned(), "1".to_owned()),
            ("topics".to_owned(), "arrivals,containers".to_owned()),
            ("token".to_owned(), "abc123".to_owned()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn token_is_looked_up_on_every_attempt() {
    let logged_in = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&logged_in);
    let provider = move || {
        flag.load(Ordering::SeqCst)
            .then(|| SecretString::from("fresh".to_owned()))
    };
    let (client, transport) = client_with(RealtimeConfig::default(), Arc::new(provider));

    client.start();
    assert!(!transport.last_url().query().unwrap_or_default().contains("token"));

    logged_in.store(true, Ordering::SeqCst);
    transport.drop_connection();
    settle().await;
    advance(1_300).await;

    assert_eq!(transport.open_count(), 2);
    assert!(transport.last_url().query().unwrap_or_default().contains("token=fresh"));
}

// ── Backoff ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconnect_delays_double_and_reset_after_open() {
    let (client, transport) = client();
    client.start();

    // First failure: retry 0, delay in [1000, 1250).
    transport.drop_connection();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.reconnect_pending());
    assert_eq!(client.retry_count(), 1);
    advance(990).await;
    assert_eq!(transport.open_count(), 1);
    advance(270).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(client.state(), ConnectionState::Connecting);

    // Second failure without an open: retry 1, delay in [2000, 2250).
    transport.drop_connection();
    settle().await;
    assert_eq!(client.retry_count(), 2);
    advance(1_990).await;
    assert_eq!(transport.open_count(), 2);
    advance(270).await;
    assert_eq!(transport.open_count(), 3);

    // A successful open resets the counter.
    transport.emit(TransportEvent::Open);
    settle().await;
    assert_eq!(client.retry_count(), 0);

    transport.drop_connection();
    settle().await;
    advance(990).await;
    assert_eq!(transport.open_count(), 3);
    advance(270).await;
    assert_eq!(transport.open_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn delay_is_capped_at_max_backoff() {
    let config = RealtimeConfig {
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(300),
        ..RealtimeConfig::default()
    };
    let (client, transport) = client_with(config, Arc::new(NoCredentials));
    client.start();

    // 100, 200, then capped at 300.
    for (attempt, ceiling) in [(1, 350), (2, 450), (3, 550), (4, 550)] {
        transport.drop_connection();
        settle().await;
        advance(ceiling).await;
        assert_eq!(transport.open_count(), attempt + 1, "attempt {attempt}");
    }
    assert_eq!(client.retry_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn start_while_reconnect_pending_is_ignored() {
    let (client, transport) = client();
    client.start();
    transport.drop_connection();
    settle().await;
    assert!(client.reconnect_pending());

    client.start();
    client.start();
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.retry_count(), 1);

    advance(1_300).await;
    assert_eq!(transport.open_count(), 2);
    assert!(!client.reconnect_pending());
}

#[tokio::test(start_paused = true)]
async fn unsupported_scheme_schedules_retry() {
    let config = RealtimeConfig::new(Url::parse("ftp://files.example.com").unwrap());
    let (client, transport) = client_with(config, Arc::new(NoCredentials));

    client.start();
    assert_eq!(transport.open_count(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.reconnect_pending());
    assert_eq!(client.retry_count(), 1);

    advance(1_300).await;
    assert_eq!(transport.open_count(), 0);
    assert_eq!(client.retry_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn refused_open_schedules_retry() {
    let (client, transport) = client();
    transport.refuse_open.store(true, Ordering::SeqCst);

    client.start();
    assert!(client.reconnect_pending());

    transport.refuse_open.store(false, Ordering::SeqCst);
    advance(1_300).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn transport_error_alone_does_not_reconnect() {
    let (client, transport) = connected().await;
    transport.emit(TransportEvent::Error("reset by peer".into()));
    settle().await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(!client.reconnect_pending());
}

// ── Keepalive ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn keepalive_pings_only_while_connected() {
    let (client, transport) = connected().await;

    advance(19_000).await;
    assert!(transport.sent().is_empty());
    advance(1_000).await;
    advance(20_000).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    for ping in &sent {
        assert_eq!(ping["type"], "system.ping");
        assert!(ping["ts"].is_i64());
    }

    transport.drop_connection();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    advance(60_000).await;
    // Reconnected but never opened: still no further pings.
    assert_eq!(client.state(), ConnectionState::Connecting);
    assert_eq!(transport.sent().len(), 2);
}

// ── Message handling ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn bulk_envelope_fans_out_each_event_in_order() {
    let (client, transport) = connected().await;
    let seen = record(&client);

    transport.message(&json!({
        "type": "bulk",
        "events": [
            {"resource": "containers", "action": "updated", "id": 1},
            {"resource": "containers", "action": "deleted", "id": 1}
        ]
    }));
    settle().await;

    let kinds: Vec<String> = seen.lock().unwrap().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds, vec!["containers.updated", "containers.deleted"]);
}

#[tokio::test(start_paused = true)]
async fn single_message_is_normalized() {
    let (client, transport) = connected().await;
    let seen = record(&client);
    assert_eq!(client.last_event_at(), None);

    transport.message(&json!({"resource": "containers", "action": "updated", "id": 7}));
    transport.message(&json!({}));
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].kind, "containers.updated");
    assert_eq!(seen[0].numeric_id(), Some(7));
    assert!(seen[1].is_unknown());
    assert!(client.last_event_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn undecodable_payload_is_dropped_quietly() {
    let (client, transport) = connected().await;
    let seen = record(&client);

    transport.emit(TransportEvent::Message("{not json".into()));
    transport.message(&json!({"type": "arrivals.created"}));
    settle().await;

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(!client.reconnect_pending());
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_callback_stops_receiving() {
    let (client, transport) = connected().await;
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let subscription = client.subscribe(move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    transport.message(&json!({"type": "arrivals.created"}));
    settle().await;
    subscription.unsubscribe();
    subscription.unsubscribe();
    transport.message(&json!({"type": "arrivals.created"}));
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(client.subscriber_count(), 0);
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnect() {
    let (client, transport) = client();
    client.start();
    transport.drop_connection();
    settle().await;
    assert!(client.reconnect_pending());

    client.shutdown();
    assert!(!client.reconnect_pending());
    assert_eq!(client.retry_count(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    advance(60_000).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_keepalive_and_allows_restart() {
    let (client, transport) = connected().await;
    let mut states = client.watch_state();

    client.shutdown();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    advance(60_000).await;
    assert!(transport.sent().is_empty());
    assert!(!client.reconnect_pending());

    client.start();
    assert_eq!(transport.open_count(), 2);
    transport.emit(TransportEvent::Open);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn shutdown_after_retry_timer_fires_prevents_reconnect() {
    // The provider runs on the timer task after the sleep has elapsed, so a
    // shutdown issued from it lands exactly between wake-up and reconnect.
    let handle: Arc<OnceLock<RealtimeClient>> = Arc::new(OnceLock::new());
    let lookups = Arc::new(AtomicUsize::new(0));
    let provider = {
        let handle = Arc::clone(&handle);
        let lookups = Arc::clone(&lookups);
        move || -> Option<SecretString> {
            if lookups.fetch_add(1, Ordering::SeqCst) == 1 {
                handle.get().unwrap().shutdown();
            }
            None
        }
    };
    let (client, transport) = client_with(RealtimeConfig::default(), Arc::new(provider));
    handle.set(client.clone()).ok();

    client.start();
    transport.drop_connection();
    settle().await;
    assert!(client.reconnect_pending());

    advance(1_300).await;
    assert_eq!(lookups.load(Ordering::SeqCst), 2);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.reconnect_pending());

    advance(60_000).await;
    assert_eq!(transport.open_count(), 1);

    // Not wedged: a fresh start connects.
    client.start();
    assert_eq!(transport.open_count(), 2);
    assert_eq!(client.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn credential_provider_may_call_back_into_client() {
    let handle: Arc<OnceLock<RealtimeClient>> = Arc::new(OnceLock::new());
    let observed = Arc::new(Mutex::new(Vec::new()));
    let provider = {
        let handle = Arc::clone(&handle);
        let observed = Arc::clone(&observed);
        move || -> Option<SecretString> {
            let client = handle.get().unwrap();
            observed.lock().unwrap().push((client.state(), client.retry_count()));
            Some(SecretString::from("t".to_owned()))
        }
    };
    let (client, transport) = client_with(RealtimeConfig::default(), Arc::new(provider));
    handle.set(client.clone()).ok();

    client.start();
    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        *observed.lock().unwrap(),
        vec![(ConnectionState::Disconnected, 0)]
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_last_handle_closes_transport() {
    let (client, transport) = connected().await;
    let clone = client.clone();
    drop(client);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 0);

    drop(clone);
    settle().await;
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
}

// ── Push transport abstraction ──
//
// The connection manager in `quayside-core` only ever talks to this trait.
// `WsTransport` implements it over tokio-tungstenite; tests plug in a fake.

use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;

/// Lifecycle notifications a transport delivers for one connection.
///
/// A connection opened through [`Transport::open`] reports `Open` once the
/// handshake completes, any number of `Message`s, and ends with exactly one
/// `Close`. An `Error` may precede the `Close`, but never replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close { code: Option<u16>, reason: String },
    Error(String),
}

/// Minimal push-socket interface: open, send, close.
///
/// Callbacks are expressed as [`TransportEvent`]s pushed into the channel
/// handed to [`open`](Self::open), so the caller drains them sequentially.
/// A connection torn down through [`close`](Self::close) emits no further
/// events.
pub trait Transport: Send + Sync + 'static {
    /// Begin connecting to `url`. Returns once the attempt is under way;
    /// the outcome arrives through `events`.
    fn open(&self, url: &Url, events: mpsc::UnboundedSender<TransportEvent>)
    -> Result<(), Error>;

    /// Queue a text frame on the current connection.
    fn send(&self, text: String) -> Result<(), Error>;

    /// Close the current connection, if any. Never fails.
    fn close(&self);
}

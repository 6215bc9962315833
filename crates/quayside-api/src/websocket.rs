//! WebSocket push transport.
//!
//! [`WsTransport`] implements [`Transport`] over `tokio-tungstenite`. Each
//! call to [`open`](Transport::open) spawns one background task that owns the
//! socket: it performs the handshake, forwards inbound frames as
//! [`TransportEvent`]s and writes queued outbound frames. Reconnection policy
//! lives one layer up, in `quayside-core`.
//!
//! # Example
//!
//! ```rust,ignore
//! use quayside_api::{Transport, TransportEvent, WsTransport};
//! use tokio::sync::mpsc;
//! use url::Url;
//!
//! let transport = WsTransport::new();
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! transport.open(&Url::parse("wss://api.example.com/ws?v=1")?, tx)?;
//!
//! while let Some(event) = rx.recv().await {
//!     if let TransportEvent::Message(text) = event {
//!         println!("{text}");
//!     }
//! }
//! ```

use std::sync::{Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{Transport, TransportEvent};

// ── WsTransport ──────────────────────────────────────────────────────

/// The live half of an open connection, as seen from the caller's side.
struct ActiveConnection {
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

/// WebSocket implementation of [`Transport`].
///
/// Holds at most one connection; opening a new one tears down the previous
/// connection first.
#[derive(Default)]
pub struct WsTransport {
    active: Mutex<Option<ActiveConnection>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_active(&self) -> Option<ActiveConnection> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Transport for WsTransport {
    fn open(
        &self,
        url: &Url,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), Error> {
        let uri: tungstenite::http::Uri = url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;

        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveConnection {
                outbound,
                cancel: cancel.clone(),
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        tokio::spawn(run_connection(
            ClientRequestBuilder::new(uri),
            events,
            outbound_rx,
            cancel,
        ));
        Ok(())
    }

    fn send(&self, text: String) -> Result<(), Error> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(conn) = active.as_ref() else {
            return Err(Error::NotConnected);
        };
        conn.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| Error::NotConnected)
    }

    fn close(&self) {
        if let Some(conn) = self.take_active() {
            conn.cancel.cancel();
        }
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Handshake, then pump frames in both directions until the socket drops
/// or the connection is cancelled locally.
async fn run_connection(
    request: ClientRequestBuilder,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let ws_stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Close {
                code: None,
                reason: "handshake failed".into(),
            });
            return;
        }
    };

    tracing::debug!("WebSocket handshake complete");
    let _ = events.send(TransportEvent::Open);

    let (mut write, mut read) = ws_stream.split();

    let (code, reason) = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            Some(msg) = outbound.recv() => {
                if let Err(e) = write.send(msg).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break (None, e.to_string());
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(TransportEvent::Message(text));
                    }
                    Err(_) => tracing::trace!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(cf) => (Some(u16::from(cf.code)), cf.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                }
                // tungstenite answers pings itself; pongs and raw frames carry nothing
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break (None, e.to_string());
                }
                None => break (None, "stream ended".into()),
            }
        }
    };

    tracing::debug!(?code, %reason, "WebSocket closed");
    let _ = events.send(TransportEvent::Close { code, reason });
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_connection_fails() {
        let transport = WsTransport::new();
        assert!(matches!(
            transport.send("{}".into()),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn close_without_connection_is_noop() {
        let transport = WsTransport::new();
        transport.close();
        transport.close();
    }
}

use thiserror::Error;

/// Top-level error type for the `quayside-api` crate.
///
/// Covers every failure mode of the push channel: endpoint construction,
/// WebSocket transport, and wire encoding. `quayside-core` absorbs these
/// into scheduled retries or silent drops; nothing here reaches the UI.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// Base address uses a scheme that has no push-protocol counterpart.
    #[error("Unsupported URL scheme '{scheme}' (expected http or https)")]
    UnsupportedScheme { scheme: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// A send was attempted with no open connection.
    #[error("Transport is not connected")]
    NotConnected,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of an outbound message failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

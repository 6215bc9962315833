// ── Core error types ──
//
// Errors that can occur inside the sync engine. None of them escape the
// public entry points of `RealtimeClient`: they are logged and turned into
// a scheduled retry or a dropped message. The `From<quayside_api::Error>`
// impl translates wire-layer errors into engine-level variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Invalid push endpoint: {message}")]
    Endpoint { message: String },

    #[error("Cannot open push channel: {reason}")]
    ConnectionFailed { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Undecodable push payload: {message}")]
    Decode { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<quayside_api::Error> for CoreError {
    fn from(err: quayside_api::Error) -> Self {
        match err {
            quayside_api::Error::UnsupportedScheme { scheme } => CoreError::Endpoint {
                message: format!("unsupported scheme '{scheme}' (expected http or https)"),
            },
            quayside_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            quayside_api::Error::NotConnected => CoreError::ConnectionFailed {
                reason: "transport is not connected".into(),
            },
            quayside_api::Error::Deserialization { message, body: _ } => {
                CoreError::Decode { message }
            }
            quayside_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
        }
    }
}

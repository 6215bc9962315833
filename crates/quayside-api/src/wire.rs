// ── Wire messages ──
//
// JSON shapes exchanged over the push channel. Inbound payloads stay as
// `serde_json::Value` until the normalizer in `quayside-core` shapes them;
// only the outbound keepalive is typed here.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Type marker of the outbound keepalive message.
pub const PING_TYPE: &str = "system.ping";

/// Outbound liveness ping: `{ "type": "system.ping", "ts": <epoch-millis> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepalivePing {
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: i64,
}

impl KeepalivePing {
    pub fn at(ts: i64) -> Self {
        Self {
            kind: PING_TYPE.to_owned(),
            ts,
        }
    }

    /// A ping stamped with the current wall-clock time.
    pub fn now() -> Self {
        Self::at(Utc::now().timestamp_millis())
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode an inbound text frame into raw JSON.
pub fn decode(text: &str) -> Result<serde_json::Value, Error> {
    serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })
}

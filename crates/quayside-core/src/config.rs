// ── Runtime push-channel configuration ──
//
// These types describe *where* and *how patiently* to connect. They never
// touch disk: `quayside-config` builds a `RealtimeConfig` from TOML/env and
// hands it in.

use std::sync::LazyLock;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::CoreError;
use crate::realtime::Backoff;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_TOPICS: [&str; 2] = ["arrivals", "containers"];

// Parsed once. `DEFAULT_BASE_URL` is a literal absolute URL, so this cannot fail.
static DEFAULT_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is an absolute URL"));

/// Configuration for the push channel of a single backend.
///
/// Built by the CLI / embedding application, passed to `RealtimeClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// HTTP base address of the backend (e.g., `https://api.example.com/api`).
    pub base_url: Url,
    /// Path appended to the base address for the push endpoint.
    pub ws_path: String,
    /// Protocol version advertised as the `v` query parameter.
    pub protocol_version: u32,
    /// Resource names subscribed to, sent as a comma-separated `topics` parameter.
    pub topics: Vec<String>,
    /// Delay before the first reconnection attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the exponential part of the reconnect delay.
    pub max_backoff: Duration,
    /// Interval between `system.ping` keepalives while connected.
    pub keepalive_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.clone(),
            ws_path: DEFAULT_WS_PATH.into(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            topics: DEFAULT_TOPICS.iter().map(|t| (*t).to_owned()).collect(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(20),
        }
    }
}

impl RealtimeConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            ..Self::default()
        }
    }

    /// Backoff policy derived from the configured delays.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_backoff, self.max_backoff)
    }

    /// Build the push endpoint for one connection attempt.
    ///
    /// Swaps `http`/`https` for `ws`/`wss`, appends [`ws_path`](Self::ws_path)
    /// to the base path, and sets the `v` and `topics` query parameters.
    /// `token`, when present, is added as `token=...`.
    pub fn endpoint(&self, token: Option<&SecretString>) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CoreError::from(quayside_api::Error::UnsupportedScheme {
                    scheme: other.to_owned(),
                }));
            }
        };
        url.set_scheme(scheme).map_err(|()| CoreError::Endpoint {
            message: format!("cannot switch {} to {scheme}", self.base_url),
        })?;

        let prefix = url.path().trim_end_matches('/').to_owned();
        let suffix = self.ws_path.trim_start_matches('/');
        url.set_path(&format!("{prefix}/{suffix}"));
        url.set_query(None);
        url.set_fragment(None);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("v", &self.protocol_version.to_string());
            query.append_pair("topics", &self.topics.join(","));
            if let Some(token) = token {
                query.append_pair("token", token.expose_secret());
            }
        }

        Ok(url)
    }
}

/// Render an endpoint for logs with any `token` parameter masked.
pub fn redact_endpoint(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_owned() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

//! Shared configuration for the quayside CLI and embedding applications.
//!
//! TOML profiles, bearer-token resolution (env + keyring + plaintext),
//! and translation to `quayside_core::RealtimeConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quayside_core::config::{DEFAULT_BASE_URL, DEFAULT_PROTOCOL_VERSION, DEFAULT_WS_PATH};
use quayside_core::{CredentialProvider, EnvToken, RealtimeConfig};

/// Keyring service under which bearer tokens are stored.
pub const KEYRING_SERVICE: &str = "quayside";

/// Prefix of environment overrides, e.g. `QUAYSIDE_PROFILES__PROD__BASE_URL`.
pub const ENV_PREFIX: &str = "QUAYSIDE_";

const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found (available: {available})")]
    UnknownProfile { profile: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// A config with a single `default` profile pointing at a local backend.
    pub fn starter() -> Self {
        let mut cfg = Self::default();
        cfg.profiles.insert(DEFAULT_PROFILE.into(), Profile::default());
        cfg
    }

    /// Pick a profile: `name`, else `default_profile`, else `"default"`.
    ///
    /// With no profiles configured at all, the built-in defaults are used so
    /// a fresh install can talk to a local backend.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE)
            .to_owned();

        if let Some(profile) = self.profiles.get(&name) {
            return Ok((name, profile.clone()));
        }
        if self.profiles.is_empty() {
            return Ok((name, Profile::default()));
        }

        let mut available: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        Err(ConfigError::UnknownProfile {
            profile: name,
            available: available.join(", "),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Event output format: "table", "json", or "json-compact".
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never".
    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// A named backend profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// HTTP base URL of the backend (e.g., "https://api.example.com/api").
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Push endpoint path, appended to the base URL path.
    pub ws_path: Option<String>,

    pub protocol_version: Option<u32>,

    /// Subscribed resource names.
    pub topics: Option<Vec<String>>,

    pub initial_backoff_ms: Option<u64>,

    pub max_backoff_ms: Option<u64>,

    pub keepalive_secs: Option<u64>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Plaintext bearer token. Used only when neither env nor keyring has one.
    pub token: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_path: None,
            protocol_version: None,
            topics: None,
            initial_backoff_ms: None,
            max_backoff_ms: None,
            keepalive_secs: None,
            token_env: None,
            token: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "quayside", "quayside").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("quayside");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file path. A missing file is not an error.
///
/// Precedence, lowest first: built-in defaults, the TOML file,
/// `QUAYSIDE_`-prefixed environment variables (nesting on `__`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Bearer token stored in the OS keyring under `quayside` / `<profile>/token`.
#[derive(Debug, Clone)]
pub struct KeyringToken {
    entry: String,
}

impl KeyringToken {
    pub fn new(profile_name: &str) -> Self {
        Self {
            entry: format!("{profile_name}/token"),
        }
    }

    /// Store `token` in the keyring, replacing any previous value.
    pub fn store(&self, token: &str) -> Result<(), ConfigError> {
        keyring::Entry::new(KEYRING_SERVICE, &self.entry)?.set_password(token)?;
        Ok(())
    }

    fn lookup(&self) -> Option<SecretString> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &self.entry).ok()?;
        entry.get_password().ok().map(SecretString::from)
    }
}

impl CredentialProvider for KeyringToken {
    fn bearer_token(&self) -> Option<SecretString> {
        self.lookup()
    }
}

/// Resolve the bearer token from the credential chain.
///
/// 1. the env var named by `token_env`
/// 2. the OS keyring
/// 3. plaintext `token` in the profile
///
/// `None` means the connection proceeds unauthenticated.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    token_chain(profile, profile_name).bearer_token()
}

/// A provider that runs the credential chain at every connection attempt,
/// so tokens rotated in the environment or keyring are picked up on
/// reconnect.
pub fn token_chain(profile: &Profile, profile_name: &str) -> Arc<dyn CredentialProvider> {
    let env = profile.token_env.clone().map(EnvToken::new);
    let keyring = KeyringToken::new(profile_name);
    let plaintext = profile.token.clone().map(SecretString::from);

    Arc::new(move || {
        env.as_ref()
            .and_then(EnvToken::bearer_token)
            .or_else(|| keyring.lookup())
            .or_else(|| plaintext.clone())
    })
}

// ── Profile → runtime config ────────────────────────────────────────

/// Validate a profile and build the engine's `RealtimeConfig` from it.
pub fn profile_to_realtime_config(profile: &Profile) -> Result<RealtimeConfig, ConfigError> {
    let base_url: url::Url = profile
        .base_url
        .parse()
        .map_err(|_| invalid("base_url", format!("invalid URL: {}", profile.base_url)))?;
    if !matches!(base_url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(invalid(
            "base_url",
            format!("expected an http(s) URL, got scheme '{}'", base_url.scheme()),
        ));
    }

    let mut cfg = RealtimeConfig::new(base_url);

    let ws_path = profile.ws_path.as_deref().unwrap_or(DEFAULT_WS_PATH);
    if ws_path.contains(['?', '#']) {
        return Err(invalid("ws_path", "must be a plain path without query or fragment"));
    }
    cfg.ws_path = ws_path.to_owned();

    cfg.protocol_version = profile.protocol_version.unwrap_or(DEFAULT_PROTOCOL_VERSION);
    if cfg.protocol_version == 0 {
        return Err(invalid("protocol_version", "must be at least 1"));
    }

    if let Some(ref topics) = profile.topics {
        if topics.is_empty() {
            return Err(invalid("topics", "at least one topic is required"));
        }
        if let Some(bad) = topics.iter().find(|t| t.is_empty() || t.contains(',')) {
            return Err(invalid("topics", format!("invalid topic name '{bad}'")));
        }
        cfg.topics.clone_from(topics);
    }

    if let Some(ms) = profile.initial_backoff_ms {
        if ms == 0 {
            return Err(invalid("initial_backoff_ms", "must be greater than zero"));
        }
        cfg.initial_backoff = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.max_backoff_ms {
        cfg.max_backoff = Duration::from_millis(ms);
    }
    if cfg.max_backoff < cfg.initial_backoff {
        return Err(invalid(
            "max_backoff_ms",
            "must not be smaller than initial_backoff_ms",
        ));
    }

    if let Some(secs) = profile.keepalive_secs {
        if secs == 0 {
            return Err(invalid("keepalive_secs", "must be greater than zero"));
        }
        cfg.keepalive_interval = Duration::from_secs(secs);
    }

    Ok(cfg)
}

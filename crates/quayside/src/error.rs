//! CLI error types with miette diagnostics.
//!
//! Maps config and core errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use quayside_config::ConfigError;
use quayside_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(quayside::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(quayside::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: quayside config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(quayside::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Keyring access failed: {reason}")]
    #[diagnostic(
        code(quayside::keyring),
        help("Set the token through the profile's token_env variable instead.")
    )]
    Keyring { reason: String },

    #[error(transparent)]
    #[diagnostic(code(quayside::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(quayside::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render config: {0}")]
    #[diagnostic(code(quayside::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. }
            | Self::ConfigExists { .. }
            | Self::Keyring { .. }
            | Self::Config(_) => exit_code::CONFIG,
            Self::Io(_) | Self::Json(_) | Self::Toml(_) => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { profile, available } => CliError::ProfileNotFound {
                name: profile,
                available,
            },
            ConfigError::Keyring(e) => CliError::Keyring {
                reason: e.to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Endpoint { message } => CliError::Validation {
                field: "base_url".into(),
                reason: message,
            },
            CoreError::ConnectionFailed { reason: message }
            | CoreError::Decode { message }
            | CoreError::Internal(message) => CliError::Io(std::io::Error::other(message)),
        }
    }
}

//! CLI configuration: thin wrapper around `quayside_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--profile, --base-url, --token, --output, --color).

use std::sync::Arc;

use secrecy::SecretString;

use quayside_core::{CredentialProvider, RealtimeConfig, StaticToken};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use quayside_config::{
    Config, KeyringToken, Profile, config_path, load_config, profile_to_realtime_config,
    save_config, token_chain,
};

/// Everything `listen` needs to build a client.
pub struct Resolved {
    pub profile_name: String,
    pub realtime: RealtimeConfig,
    pub credentials: Arc<dyn CredentialProvider>,
}

/// Resolve the active profile name and profile, with `--base-url` applied.
pub fn active_profile(global: &GlobalOpts, cfg: &Config) -> Result<(String, Profile), CliError> {
    let (name, mut profile) = cfg.profile(global.profile.as_deref())?;
    if let Some(ref url) = global.base_url {
        profile.base_url.clone_from(url);
    }
    Ok((name, profile))
}

/// Translate config + global flags into runtime settings.
///
/// A `--token` flag replaces the profile's credential chain.
pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let (profile_name, profile) = active_profile(global, cfg)?;
    let realtime = profile_to_realtime_config(&profile)?;

    let credentials: Arc<dyn CredentialProvider> = match global.token {
        Some(ref token) => Arc::new(StaticToken::new(SecretString::from(token.clone()))),
        None => token_chain(&profile, &profile_name),
    };

    Ok(Resolved {
        profile_name,
        realtime,
        credentials,
    })
}

/// Output format: flag, else `defaults.output`, else table.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or(match cfg.defaults.output.as_str() {
        "json" => OutputFormat::Json,
        "json-compact" => OutputFormat::JsonCompact,
        _ => OutputFormat::Table,
    })
}

/// Color mode: flag, else `defaults.color`, else auto.
pub fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    global.color.unwrap_or(match cfg.defaults.color.as_str() {
        "always" => ColorMode::Always,
        "never" => ColorMode::Never,
        _ => ColorMode::Auto,
    })
}

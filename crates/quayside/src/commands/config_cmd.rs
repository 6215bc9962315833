//! Config subcommand handlers.

use std::io::BufRead;

use serde_json::json;

use quayside_core::credentials::has_token;
use quayside_core::redact_endpoint;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config, KeyringToken};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_line(&config::config_path().display().to_string());
            Ok(())
        }
        ConfigCommand::Show => show(global),
        ConfigCommand::Init { force } => init(force, global.quiet),
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            for name in names {
                let marker = if name == default { "*" } else { " " };
                output::print_line(&format!("{marker} {name}"));
            }
            Ok(())
        }
        ConfigCommand::SetToken => set_token(global),
    }
}

// ── Show ────────────────────────────────────────────────────────────

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config()?;
    let resolved = config::resolve(global, &cfg)?;
    let (_, mut profile) = config::active_profile(global, &cfg)?;
    if profile.token.is_some() {
        profile.token = Some("***".into());
    }

    let realtime = &resolved.realtime;
    let endpoint = redact_endpoint(&realtime.endpoint(None)?);
    let authenticated = has_token(resolved.credentials.as_ref());

    let rendered = match config::output_format(global, &cfg) {
        OutputFormat::Table => {
            let mut out = format!(
                "# profile: {}\n# endpoint: {endpoint}\n# token: {}\n\n",
                resolved.profile_name,
                if authenticated { "set" } else { "not set" }
            );
            out.push_str(&toml::to_string_pretty(&profile)?);
            out
        }
        format => {
            let view = json!({
                "profile": resolved.profile_name,
                "endpoint": endpoint,
                "token": authenticated,
                "topics": realtime.topics,
                "initial_backoff_ms": duration_ms(realtime.initial_backoff),
                "max_backoff_ms": duration_ms(realtime.max_backoff),
                "keepalive_secs": realtime.keepalive_interval.as_secs(),
            });
            if format == OutputFormat::Json {
                serde_json::to_string_pretty(&view)?
            } else {
                serde_json::to_string(&view)?
            }
        }
    };

    output::print_line(rendered.trim_end());
    Ok(())
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Init ────────────────────────────────────────────────────────────

fn init(force: bool, quiet: bool) -> Result<(), CliError> {
    let path = config::config_path();
    if path.exists() && !force {
        return Err(CliError::ConfigExists {
            path: path.display().to_string(),
        });
    }

    let written = config::save_config(&Config::starter())?;
    if !quiet {
        eprintln!("Wrote starter config to {}", written.display());
    }
    Ok(())
}

// ── Set token ───────────────────────────────────────────────────────

fn set_token(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config()?;
    let (name, _) = config::active_profile(global, &cfg)?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let token = line.trim();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "no token on standard input".into(),
        });
    }

    KeyringToken::new(&name).store(token)?;
    if !global.quiet {
        eprintln!("Stored token for profile '{name}' in the system keyring");
    }
    Ok(())
}

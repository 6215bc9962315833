//! Output formatting for streamed events: aligned lines or JSON.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;

use quayside_core::{ConnectionState, Event, Reconciliation};

use crate::cli::{ColorMode, OutputFormat};

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// One streamed event as emitted in JSON modes.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    pub received_at: DateTime<Utc>,
    pub event: &'a Event,
    pub reconciliation: &'static str,
}

/// Cache action an event maps to. The listener holds no cached queries, so
/// entry counts are always zero and are left out.
pub fn describe(outcome: Reconciliation) -> &'static str {
    match outcome {
        Reconciliation::Patched { .. } => "patch",
        Reconciliation::Invalidated { .. } => "invalidate",
        Reconciliation::Ignored => "ignore",
    }
}

/// Render one event in the chosen format.
pub fn render_event(
    format: OutputFormat,
    color: bool,
    received_at: DateTime<Utc>,
    event: &Event,
    outcome: Reconciliation,
) -> Result<String, serde_json::Error> {
    let record = EventRecord {
        received_at,
        event,
        reconciliation: describe(outcome),
    };
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&record),
        OutputFormat::JsonCompact => serde_json::to_string(&record),
        OutputFormat::Table => Ok(render_line(color, &record)),
    }
}

fn render_line(color: bool, record: &EventRecord<'_>) -> String {
    let time = record
        .received_at
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string();
    let id = record
        .event
        .id
        .as_ref()
        .map_or_else(|| "-".to_owned(), ToString::to_string);
    let kind = format!("{:<24}", record.event.kind);
    let id = format!("{id:<8}");

    if color {
        format!(
            "{}  {}  {}  {}",
            time.dimmed(),
            kind.cyan(),
            id.bold(),
            record.reconciliation.green()
        )
    } else {
        format!("{time}  {kind}  {id}  {}", record.reconciliation)
    }
}

pub fn render_state(color: bool, state: ConnectionState) -> String {
    let label = state.to_string();
    if !color {
        return format!("-- {label}");
    }
    match state {
        ConnectionState::Connected => format!("-- {}", label.green()),
        ConnectionState::Connecting => format!("-- {}", label.yellow()),
        ConnectionState::Disconnected => format!("-- {}", label.red()),
    }
}

/// Print a line to stdout, ignoring a closed pipe.
pub fn print_line(line: &str) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

//! `quayside listen`: stream live events until Ctrl-C.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::info;

use quayside_api::WsTransport;
use quayside_core::{Event, QueryStore, RealtimeClient, Reconciler, RuleTable, redact_endpoint};

use crate::cli::{GlobalOpts, ListenArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Which events get printed. Reconciliation always sees every event.
struct EventFilter {
    resources: Vec<String>,
    include_system: bool,
}

impl EventFilter {
    fn new(resources: Vec<String>, include_system: bool) -> Self {
        Self {
            resources,
            include_system,
        }
    }

    fn matches(&self, event: &Event) -> bool {
        let resource = event.resource_name().unwrap_or_default();
        if resource == "system" && !self.include_system {
            return false;
        }
        self.resources.is_empty() || self.resources.iter().any(|r| r == resource)
    }
}

pub async fn handle(args: ListenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config()?;
    let format = config::output_format(global, &cfg);
    let color = output::should_color(config::color_mode(global, &cfg));
    let resolved = config::resolve(global, &cfg)?;

    // Surface a bad base URL now instead of as an endless retry loop.
    let endpoint = resolved.realtime.endpoint(None)?;
    info!(
        profile = %resolved.profile_name,
        url = %redact_endpoint(&endpoint),
        "starting listener"
    );

    let client = RealtimeClient::new(
        resolved.realtime,
        Arc::new(WsTransport::new()),
        resolved.credentials,
    );
    let store = Arc::new(QueryStore::new());
    let reconciler = Reconciler::new(store.clone(), RuleTable::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client.subscribe(move |event: &Event| {
        let outcome = reconciler.apply(event);
        let _ = tx.send((Utc::now(), event.clone(), outcome));
    });

    let filter = EventFilter::new(args.resource, args.include_system);
    let mut states = client.watch_state();
    client.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if !global.quiet {
                    eprintln!("{}", output::render_state(color, state));
                }
            }
            Some((received_at, event, outcome)) = rx.recv() => {
                if filter.matches(&event) {
                    let line = output::render_event(format, color, received_at, &event, outcome)?;
                    output::print_line(&line);
                }
            }
        }
    }

    subscription.unsubscribe();
    client.shutdown();
    info!(cached_entries = store.len(), "listener stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quayside_core::normalize;
    use serde_json::json;

    fn event(kind: &str) -> Event {
        normalize(&json!({"type": kind}))
    }

    #[test]
    fn system_events_hidden_by_default() {
        let filter = EventFilter::new(vec![], false);
        assert!(!filter.matches(&event("system.ping")));
        assert!(filter.matches(&event("arrivals.created")));

        let verbose = EventFilter::new(vec![], true);
        assert!(verbose.matches(&event("system.ping")));
    }

    #[test]
    fn resource_filter_selects_families() {
        let filter = EventFilter::new(vec!["containers".into()], false);
        assert!(filter.matches(&event("containers.deleted")));
        assert!(!filter.matches(&event("arrivals.updated")));
        assert!(!filter.matches(&event("unknown")));
    }
}

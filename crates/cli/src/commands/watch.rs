use std::collections::HashSet;
use std::sync::Arc;

use haggl_client::{
    CommandGateway, CommandTransport, EventStreamClient, EventTransport, HttpFeedClient,
    SyntheticTransport,
};
use haggl_core::config::{AppConfig, FeedMode};
use haggl_core::errors::ApplicationError;
use haggl_core::store::{OrderStore, StoreSettings};
use haggl_core::{ConnectionState, OrderView};
use tracing::{info, warn};

use crate::commands::{build_runtime, CommandResult, EXIT_BACKEND, EXIT_ORDER_FAILED};

const COMMAND: &str = "watch";
pub const DEFAULT_SYNTHETIC_ORDER: &str = "ORD-DEMO";

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub order_id: Option<String>,
    pub synthetic: bool,
    pub json: bool,
    pub auto_approve: bool,
}

enum WatchEnd {
    Terminal(OrderView),
    Interrupted,
    Closed,
}

pub fn run(config: &AppConfig, options: WatchOptions) -> CommandResult {
    let (events, commands) = match transports(config, &options) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    run_with(config, options, events, commands)
}

/// Watch over caller-supplied transports.
pub fn run_with(
    config: &AppConfig,
    options: WatchOptions,
    events: Arc<dyn EventTransport>,
    commands: Arc<dyn CommandTransport>,
) -> CommandResult {
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    runtime.block_on(watch(config, options, events, commands))
}

fn transports(
    config: &AppConfig,
    options: &WatchOptions,
) -> Result<(Arc<dyn EventTransport>, Arc<dyn CommandTransport>), CommandResult> {
    if is_synthetic(config, options) {
        let order_id =
            options.order_id.clone().unwrap_or_else(|| DEFAULT_SYNTHETIC_ORDER.to_owned());
        let transport = Arc::new(SyntheticTransport::from_config(order_id, &config.feed));
        return Ok((transport.clone(), transport));
    }
    match HttpFeedClient::new(&config.feed) {
        Ok(client) => {
            let client = Arc::new(client);
            Ok((client.clone(), client))
        }
        Err(error) => {
            Err(CommandResult::failure(COMMAND, "transport_init", error.to_string(), EXIT_BACKEND))
        }
    }
}

fn is_synthetic(config: &AppConfig, options: &WatchOptions) -> bool {
    options.synthetic || config.feed.mode == FeedMode::Synthetic
}

async fn watch(
    config: &AppConfig,
    options: WatchOptions,
    events: Arc<dyn EventTransport>,
    commands: Arc<dyn CommandTransport>,
) -> CommandResult {
    let (store, mut terminal) = OrderStore::init(StoreSettings::from(&config.view));
    let stream = EventStreamClient::from_config(events, store.clone(), &config.feed);
    let gateway = CommandGateway::new(commands, store.clone());
    let mut updates = store.subscribe();
    let stream_task = tokio::spawn(async move { stream.run().await });

    info!(
        event_name = "cli.watch.started",
        mode = if is_synthetic(config, &options) { "synthetic" } else { "http" },
        order_id = options.order_id.as_deref().unwrap_or("*"),
        "watching order feed"
    );

    let mut printer = SnapshotPrinter::new(options.json);
    let mut approved = HashSet::new();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let end = loop {
        tokio::select! {
            transition = terminal.recv() => {
                let Some(transition) = transition else {
                    break WatchEnd::Closed;
                };
                if tracks(&options, transition.order_id.as_deref()) {
                    break WatchEnd::Terminal(store.snapshot());
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break WatchEnd::Closed;
                }
                let view = updates.borrow_and_update().clone();
                printer.print(&view);
                // failed orders never request a terminal transition
                if view.failed && tracks(&options, view.order_id.as_deref()) {
                    break WatchEnd::Terminal(view);
                }
                if options.auto_approve {
                    approve_pending(&gateway, &view, &options, &mut approved).await;
                }
            }
            _ = &mut interrupt => break WatchEnd::Interrupted,
        }
    };

    store.dispose();
    if let Err(error) = stream_task.await {
        warn!(
            event_name = "cli.watch.stream_task_failed",
            error = %error,
            "stream task ended abnormally"
        );
    }

    match end {
        WatchEnd::Terminal(view) => {
            let order = view.order_id.as_deref().unwrap_or("order");
            if view.failed {
                CommandResult::failure(
                    COMMAND,
                    "order_failed",
                    format!("{order} failed"),
                    EXIT_ORDER_FAILED,
                )
            } else {
                CommandResult::success(COMMAND, format!("{order} reached {}", view.phase.as_str()))
            }
        }
        WatchEnd::Interrupted => CommandResult::success(COMMAND, "stopped by operator"),
        WatchEnd::Closed => CommandResult::failure(
            COMMAND,
            "session_closed",
            "order session closed before the order finished",
            EXIT_BACKEND,
        ),
    }
}

/// `--order` narrows reactions to one order; without it every order counts.
fn tracks(options: &WatchOptions, order_id: Option<&str>) -> bool {
    match (options.order_id.as_deref(), order_id) {
        (Some(wanted), Some(actual)) => wanted == actual,
        _ => true,
    }
}

async fn approve_pending(
    gateway: &CommandGateway,
    view: &OrderView,
    options: &WatchOptions,
    approved: &mut HashSet<String>,
) {
    for pending in &view.pending_approvals {
        if !tracks(options, Some(&pending.order_id)) {
            continue;
        }
        if !approved.insert(pending.order_id.clone()) {
            continue;
        }
        match gateway.approve(&pending.order_id).await {
            Ok(receipt) => info!(
                event_name = "cli.watch.auto_approved",
                order_id = %receipt.order_id,
                correlation_id = %receipt.correlation_id,
                "pending purchase approved"
            ),
            Err(error) => {
                // backend hiccups are retried on a later snapshot; rejections are final
                if ApplicationError::from(error.clone()).is_retryable() {
                    approved.remove(&pending.order_id);
                }
                warn!(
                    event_name = "cli.watch.auto_approve_failed",
                    order_id = %pending.order_id,
                    error = %error,
                    "automatic approval failed"
                );
            }
        }
    }
}

struct SnapshotPrinter {
    json: bool,
    last: Option<String>,
}

impl SnapshotPrinter {
    fn new(json: bool) -> Self {
        Self { json, last: None }
    }

    fn print(&mut self, view: &OrderView) {
        let line = if self.json {
            match serde_json::to_string(view) {
                Ok(line) => line,
                Err(error) => {
                    warn!(
                        event_name = "cli.watch.render_failed",
                        error = %error,
                        "snapshot not printed"
                    );
                    return;
                }
            }
        } else {
            render_summary(view)
        };

        if self.last.as_deref() != Some(line.as_str()) {
            println!("{line}");
            self.last = Some(line);
        }
    }
}

/// One human-readable line per distinct view.
pub fn render_summary(view: &OrderView) -> String {
    let stage = view.stage.as_ref().map(|stage| stage.as_str()).unwrap_or("-");
    let connection = match view.connection.state {
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Disconnected => "disconnected",
    };
    let mut line = format!(
        "[{}] stage={stage} vendors={} pending={} feed={connection}",
        view.phase.as_str(),
        view.vendors.len(),
        view.pending_approvals.len(),
    );
    if let Some(selected) = &view.selected_vendor {
        line.push_str(&format!(" selected={selected}"));
    }
    if let Some(pending) = view.pending_approvals.first() {
        line.push_str(&format!(" awaiting={} ${:.2}", pending.order_id, pending.total()));
    }
    if let Some(latest) = view.activity.front() {
        line.push_str(&format!(" | {}", latest.message));
    }
    line
}

#[cfg(test)]
mod tests {
    use haggl_core::domain::{AgentEvent, AgentStage, EventType};
    use haggl_core::reconciler::{Fact, OrderView, Reconciler};

    use super::{render_summary, tracks, WatchOptions};

    #[test]
    fn summary_names_phase_counts_and_latest_activity() {
        let mut view = OrderView::default();
        let event =
            AgentEvent::new(EventType::VendorUpdate, Some(AgentStage::Sourcing), "Found Acme")
                .with_order("O-1")
                .with_data("vendor_name", "Acme");
        Reconciler::new(10).apply(&mut view, &Fact::Event(event));

        let line = render_summary(&view);
        assert!(line.starts_with("[sourcing] stage=sourcing vendors=1 pending=0"), "{line}");
        assert!(line.ends_with("| Found Acme"), "{line}");
    }

    #[test]
    fn summary_shows_the_pending_order_total() {
        let mut view = OrderView::default();
        let event = AgentEvent::new(
            EventType::ApprovalRequired,
            Some(AgentStage::ApprovalPending),
            "Approval needed",
        )
        .with_order("O-1")
        .with_data("vendor_name", "Acme")
        .with_data("price", 4.25)
        .with_data("quantity", 100);
        Reconciler::new(10).apply(&mut view, &Fact::Event(event));

        let line = render_summary(&view);
        assert!(line.contains("pending=1"), "{line}");
        assert!(line.contains("awaiting=O-1 $425.00"), "{line}");
    }

    #[test]
    fn order_filter_only_applies_when_both_sides_are_known() {
        let filtered = WatchOptions { order_id: Some("O-1".to_owned()), ..WatchOptions::default() };
        assert!(tracks(&filtered, Some("O-1")));
        assert!(!tracks(&filtered, Some("O-2")));
        assert!(tracks(&filtered, None));
        assert!(tracks(&WatchOptions::default(), Some("O-2")));
    }
}

//! Owned state container for one order-tracking session.
//!
//! The stream client and the command gateway are the only writers. Readers
//! get immutable snapshots or a `watch::Receiver` that is notified after
//! every fold. `dispose` ends the session: later folds are discarded, the
//! shutdown signal fires and pending terminal transitions are cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ViewConfig;
use crate::reconciler::{
    ConnectionState, ConnectionStatus, Fact, FoldOutcome, OrderView, Reconciler, TerminalTransition,
    DEFAULT_LOG_CAPACITY,
};

pub const DEFAULT_TERMINAL_DELAY: Duration = Duration::from_millis(5_000);

pub type TerminalTransitions = mpsc::UnboundedReceiver<TerminalTransition>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreSettings {
    pub log_capacity: usize,
    pub terminal_delay: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { log_capacity: DEFAULT_LOG_CAPACITY, terminal_delay: DEFAULT_TERMINAL_DELAY }
    }
}

impl From<&ViewConfig> for StoreSettings {
    fn from(config: &ViewConfig) -> Self {
        Self {
            log_capacity: config.activity_log_capacity,
            terminal_delay: Duration::from_millis(config.terminal_redirect_delay_ms),
        }
    }
}

/// Resolves once the owning store is disposed.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn wait(&mut self) {
        // a dropped store counts as shut down
        let _ = self.receiver.wait_for(|closed| *closed).await;
    }
}

pub struct OrderStore {
    reconciler: Reconciler,
    state: watch::Sender<OrderView>,
    shutdown: watch::Sender<bool>,
    terminal_delay: Duration,
    terminal_tx: mpsc::UnboundedSender<TerminalTransition>,
}

impl OrderStore {
    pub fn init(settings: StoreSettings) -> (Arc<Self>, TerminalTransitions) {
        let (state, _) = watch::channel(OrderView::default());
        let (shutdown, _) = watch::channel(false);
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();

        let store = Arc::new(Self {
            reconciler: Reconciler::new(settings.log_capacity),
            state,
            shutdown,
            terminal_delay: settings.terminal_delay,
            terminal_tx,
        });
        (store, terminal_rx)
    }

    pub fn snapshot(&self) -> OrderView {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderView> {
        self.state.subscribe()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal { receiver: self.shutdown.subscribe() }
    }

    pub fn is_disposed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn dispose(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        info!(event_name = "view.store.disposed", "order store disposed");
    }

    /// Fold one fact. Returns `None` when the store has been disposed and the
    /// fact was discarded.
    pub fn apply(&self, fact: Fact) -> Option<FoldOutcome> {
        if self.is_disposed() {
            debug!(event_name = "view.store.discarded", "fact arrived after dispose; discarded");
            return None;
        }

        let mut outcome = FoldOutcome::default();
        self.state.send_modify(|view| {
            outcome = self.reconciler.apply(view, &fact);
        });

        if let Some(transition) = outcome.terminal.clone() {
            self.schedule_terminal(transition);
        }
        Some(outcome)
    }

    pub fn mark_connecting(&self) {
        self.update_connection(|status| status.state = ConnectionState::Connecting);
    }

    pub fn mark_connected(&self) {
        self.update_connection(|status| {
            status.state = ConnectionState::Connected;
            status.last_error = None;
        });
    }

    pub fn mark_disconnected(&self, error: impl Into<String>) {
        let error = error.into();
        self.update_connection(|status| {
            status.state = ConnectionState::Disconnected;
            status.last_error = Some(error);
            status.reconnect_attempts = status.reconnect_attempts.saturating_add(1);
        });
    }

    /// Surface a failed backfill without touching the live connection state.
    pub fn record_backfill_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.update_connection(|status| status.backfill_error = Some(error));
    }

    fn update_connection(&self, update: impl FnOnce(&mut ConnectionStatus)) {
        if self.is_disposed() {
            return;
        }
        self.state.send_modify(|view| update(&mut view.connection));
    }

    fn schedule_terminal(&self, transition: TerminalTransition) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                event_name = "view.terminal.unscheduled",
                order_id = transition.order_id.as_deref().unwrap_or("unknown"),
                "no async runtime available; terminal transition not scheduled"
            );
            return;
        };

        let delay = self.terminal_delay;
        let sender = self.terminal_tx.clone();
        let mut shutdown = self.shutdown_signal();
        info!(
            event_name = "view.terminal.scheduled",
            order_id = transition.order_id.as_deref().unwrap_or("unknown"),
            delay_ms = delay.as_millis() as u64,
            "terminal transition scheduled"
        );

        handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if shutdown.is_shutdown() {
                        return;
                    }
                    let _ = sender.send(transition);
                }
                _ = shutdown.wait() => {
                    debug!(event_name = "view.terminal.cancelled", "terminal transition cancelled");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::domain::{AgentEvent, AgentStage, EventType, Phase};
    use crate::reconciler::{ConnectionState, Fact};

    use super::{OrderStore, StoreSettings};

    fn settings(delay_ms: u64) -> StoreSettings {
        StoreSettings { log_capacity: 100, terminal_delay: Duration::from_millis(delay_ms) }
    }

    fn completed(order_id: &str) -> Fact {
        Fact::Event(
            AgentEvent::new(EventType::StageChange, Some(AgentStage::Completed), "done")
                .with_order(order_id),
        )
    }

    #[tokio::test]
    async fn subscribers_see_each_fold() {
        let (store, _terminal) = OrderStore::init(settings(5_000));
        let mut receiver = store.subscribe();

        store.apply(Fact::Event(AgentEvent::new(
            EventType::StageChange,
            Some(AgentStage::Evaluating),
            "evaluating",
        )));

        receiver.changed().await.expect("store alive");
        assert_eq!(receiver.borrow_and_update().phase, Phase::Evaluating);
    }

    #[tokio::test]
    async fn disposed_store_discards_facts_and_connection_updates() {
        let (store, _terminal) = OrderStore::init(settings(5_000));
        store.dispose();

        assert!(store.apply(completed("O1")).is_none());
        store.mark_connected();

        let view = store.snapshot();
        assert_eq!(view.facts_applied, 0);
        assert_eq!(view.connection.state, ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn connection_transitions_track_errors_and_attempts() {
        let (store, _terminal) = OrderStore::init(settings(5_000));

        store.mark_disconnected("connection reset");
        assert_eq!(store.snapshot().connection.last_error.as_deref(), Some("connection reset"));

        store.record_backfill_error("recent events unavailable");
        store.mark_connected();
        let status = store.snapshot().connection;
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.last_error, None);
        assert_eq!(status.reconnect_attempts, 1);
        assert_eq!(status.backfill_error.as_deref(), Some("recent events unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_transition_fires_once_after_delay() {
        let (store, mut terminal) = OrderStore::init(settings(5_000));

        store.apply(completed("O1"));
        store.apply(completed("O1"));

        let transition = terminal.recv().await.expect("terminal transition");
        assert_eq!(transition.order_id.as_deref(), Some("O1"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(terminal.try_recv().is_err(), "only one transition per order");
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_terminal_transition() {
        let (store, mut terminal) = OrderStore::init(settings(5_000));

        store.apply(completed("O1"));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        store.dispose();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(terminal.try_recv().is_err());
    }

    #[test]
    fn apply_outside_runtime_still_folds() {
        let (store, _terminal) = OrderStore::init(settings(0));
        let outcome = store.apply(completed("O1")).expect("not disposed");

        assert!(outcome.terminal.is_some());
        assert_eq!(store.snapshot().phase, Phase::Complete);
    }
}

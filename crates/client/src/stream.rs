use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use haggl_core::config::FeedConfig;
use haggl_core::domain::AgentEvent;
use haggl_core::reconciler::Fact;
use haggl_core::store::OrderStore;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("event stream closed by server")]
    Closed,
    #[error("request failed: {0}")]
    Request(String),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response could not be decoded: {0}")]
    Decode(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Fixed-delay, unbounded reconnect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { delay_ms: 3_000 }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Source of feed payloads. `next_payload` yields one raw JSON event per
/// call; `Ok(None)` means the server closed the stream.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_payload(&self) -> Result<Option<String>, TransportError>;
    /// Most recent events, newest first.
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<Value>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct EventStreamClient {
    transport: Arc<dyn EventTransport>,
    store: Arc<OrderStore>,
    reconnect_policy: ReconnectPolicy,
    backfill_limit: u32,
}

impl EventStreamClient {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        store: Arc<OrderStore>,
        reconnect_policy: ReconnectPolicy,
        backfill_limit: u32,
    ) -> Self {
        Self { transport, store, reconnect_policy, backfill_limit }
    }

    pub fn from_config(
        transport: Arc<dyn EventTransport>,
        store: Arc<OrderStore>,
        config: &FeedConfig,
    ) -> Self {
        Self::new(
            transport,
            store,
            ReconnectPolicy { delay_ms: config.reconnect_delay_ms },
            config.backfill_limit,
        )
    }

    /// Backfill and live subscription side by side until the store is
    /// disposed. Never returns early on transport failure.
    pub async fn run(&self) {
        let mut shutdown = self.store.shutdown_signal();
        let backfill = async {
            tokio::select! {
                _ = self.backfill() => {}
                _ = shutdown.wait() => {
                    debug!(event_name = "feed.backfill.cancelled", "backfill abandoned");
                }
            }
        };

        tokio::join!(backfill, self.live_loop());
        info!(event_name = "feed.stream.stopped", "event stream client stopped");
    }

    /// One-shot fetch of recent history, folded oldest first. Returns the
    /// number of events applied.
    pub async fn backfill(&self) -> usize {
        let events = match self.transport.fetch_recent(self.backfill_limit).await {
            Ok(events) => events,
            Err(error) => {
                warn!(
                    event_name = "feed.backfill.failed",
                    limit = self.backfill_limit,
                    error = %error,
                    "could not fetch recent events"
                );
                self.store.record_backfill_error(error.to_string());
                return 0;
            }
        };

        let fetched = events.len();
        let mut applied = 0;
        for value in events.into_iter().rev() {
            match AgentEvent::from_value(value) {
                Ok(event) => {
                    if self.store.apply(Fact::Event(event)).is_some() {
                        applied += 1;
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "ingress.feed.decode_failed",
                        source = "backfill",
                        error = %error,
                        "dropping malformed backfill event"
                    );
                }
            }
        }

        info!(event_name = "feed.backfill.completed", fetched, applied, "backfill folded");
        applied
    }

    async fn live_loop(&self) {
        let mut shutdown = self.store.shutdown_signal();
        let mut attempt: u32 = 0;

        while !shutdown.is_shutdown() {
            let failure = tokio::select! {
                error = self.connect_and_pump(attempt) => error,
                _ = shutdown.wait() => break,
            };

            warn!(
                event_name = "feed.stream.disconnected",
                attempt,
                delay_ms = self.reconnect_policy.delay_ms,
                error = %failure,
                "event stream dropped; reconnecting after delay"
            );
            self.store.mark_disconnected(failure.to_string());
            self.close_subscription().await;

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_policy.delay()) => {}
                _ = shutdown.wait() => break,
            }
            attempt = attempt.saturating_add(1);
        }

        self.close_subscription().await;
    }

    /// Runs until the subscription fails. Returns the failure.
    async fn connect_and_pump(&self, attempt: u32) -> TransportError {
        self.store.mark_connecting();
        info!(event_name = "feed.stream.connecting", attempt, "opening event stream");
        if let Err(error) = self.transport.connect().await {
            return error;
        }
        self.store.mark_connected();
        info!(event_name = "feed.stream.connected", attempt, "event stream connected");

        loop {
            match self.transport.next_payload().await {
                Ok(Some(payload)) => self.ingest(&payload),
                Ok(None) => return TransportError::Closed,
                Err(error) => return error,
            }
        }
    }

    fn ingest(&self, payload: &str) {
        let event = match AgentEvent::decode(payload) {
            Ok(event) => event,
            Err(error) => {
                warn!(
                    event_name = "ingress.feed.decode_failed",
                    source = "live",
                    error = %error,
                    payload_len = payload.len(),
                    "dropping malformed event payload"
                );
                return;
            }
        };

        debug!(
            event_name = "ingress.feed.event_received",
            event_type = event.event_type.as_str(),
            stage = event.stage.as_ref().map(|stage| stage.as_str()).unwrap_or("none"),
            order_id = event.order_id.as_deref().unwrap_or("unknown"),
            "received feed event"
        );
        self.store.apply(Fact::Event(event));
    }

    async fn close_subscription(&self) {
        if let Err(error) = self.transport.disconnect().await {
            debug!(
                event_name = "feed.stream.disconnect_failed",
                error = %error,
                "ignoring disconnect failure"
            );
        }
    }
}

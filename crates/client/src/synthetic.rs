//! Scripted order progression for running without a backend ("mock mode").
//!
//! Events are produced through the same [`EventTransport`] seam as the HTTP
//! feed, so they are folded by the one reconciler like any other event.
//! Prices are jittered from a seeded RNG to keep runs reproducible.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use haggl_core::config::FeedConfig;
use haggl_core::domain::{AgentEvent, AgentStage, EventType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::gateway::{ApproveResponse, CommandTransport};
use crate::stream::{EventTransport, TransportError};

const VENDORS: [(&str, f64); 3] =
    [("Acme Mills", 4.25), ("Prairie Grain Co", 3.95), ("Baker Supply", 4.60)];

pub struct SyntheticTransport {
    tick: Duration,
    order_id: String,
    state: Mutex<SyntheticState>,
    wake: Notify,
}

struct SyntheticState {
    queue: VecDeque<AgentEvent>,
    emitted: Vec<AgentEvent>,
    winner: Option<(String, f64)>,
    approved: bool,
}

impl SyntheticTransport {
    pub fn new(order_id: impl Into<String>, seed: u64, tick: Duration) -> Self {
        let order_id = order_id.into();
        let mut rng = StdRng::seed_from_u64(seed);
        let (queue, winner) = sourcing_script(&order_id, &mut rng);

        Self {
            tick,
            order_id,
            state: Mutex::new(SyntheticState {
                queue,
                emitted: Vec::new(),
                winner: Some(winner),
                approved: false,
            }),
            wake: Notify::new(),
        }
    }

    pub fn from_config(order_id: impl Into<String>, feed: &FeedConfig) -> Self {
        Self::new(order_id, feed.synthetic_seed, Duration::from_millis(feed.synthetic_tick_ms))
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    async fn push(&self, events: Vec<AgentEvent>) {
        self.state.lock().await.queue.extend(events);
        self.wake.notify_one();
    }
}

fn event(
    order_id: &str,
    event_type: EventType,
    stage: AgentStage,
    message: impl Into<String>,
) -> AgentEvent {
    AgentEvent::new(event_type, Some(stage), message).with_order(order_id)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sourcing through the approval request. Returns the queue and the
/// cheapest quote.
fn sourcing_script(order_id: &str, rng: &mut StdRng) -> (VecDeque<AgentEvent>, (String, f64)) {
    let stage_change =
        |stage, message: &str| event(order_id, EventType::StageChange, stage, message);
    let mut script = VecDeque::from([
        stage_change(AgentStage::MessageReceived, "Order request received: 100 lb of flour"),
        stage_change(AgentStage::Sourcing, "Searching for flour suppliers"),
    ]);

    for (name, _) in VENDORS {
        let found = format!("Found supplier {name}");
        script.push_back(
            event(order_id, EventType::VendorUpdate, AgentStage::Sourcing, found)
                .with_data("vendor_name", name),
        );
    }

    script.push_back(stage_change(AgentStage::Calling, "Calling suppliers"));

    let mut winner = (VENDORS[0].0.to_owned(), f64::MAX);
    for (name, base_price) in VENDORS {
        let price = round_cents(base_price + rng.gen_range(-0.30..=0.30));
        if price < winner.1 {
            winner = (name.to_owned(), price);
        }
        script.push_back(
            event(order_id, EventType::CallUpdate, AgentStage::Calling, format!("Calling {name}"))
                .with_data("vendor_name", name)
                .with_data("call_status", "initiated"),
        );
        let quoted = format!("{name} quoted ${price:.2}/lb");
        script.push_back(
            event(order_id, EventType::CallUpdate, AgentStage::Negotiating, quoted)
                .with_data("vendor_name", name)
                .with_data("call_status", "completed")
                .with_data("price_per_unit", price),
        );
    }

    let (vendor, unit_price) = &winner;
    let score = round_cents(rng.gen_range(72.0..=91.0));
    let selected = format!("Selected {vendor}");
    script.push_back(
        event(order_id, EventType::EvaluationUpdate, AgentStage::Evaluating, selected)
            .with_data("selected_vendor", vendor.as_str())
            .with_data("final_score", score),
    );

    let total = round_cents(unit_price * 100.0);
    let request = format!("Approval needed: 100 lb of flour from {vendor} at ${total:.2}");
    script.push_back(
        event(order_id, EventType::ApprovalRequired, AgentStage::ApprovalPending, request)
            .with_data("vendor_name", vendor.as_str())
            .with_data("price", *unit_price)
            .with_data("product", "flour")
            .with_data("quantity", 100)
            .with_data("unit", "lb"),
    );

    (script, winner)
}

/// Approval through payment.
fn payment_script(order_id: &str, vendor: &str, amount: f64) -> Vec<AgentEvent> {
    let approved = format!("Order approved! Proceeding with {vendor}");
    let paying = format!("Processing payment of ${amount:.2} to {vendor}");
    let paid = format!("Payment complete! ${amount:.2} paid to {vendor}");

    vec![
        event(order_id, EventType::OrderUpdate, AgentStage::Approved, approved)
            .with_data("vendor_name", vendor)
            .with_data("action", "approved"),
        event(order_id, EventType::PaymentUpdate, AgentStage::Paying, paying)
            .with_data("vendor_name", vendor)
            .with_data("amount", amount)
            .with_data("status", "processing"),
        event(order_id, EventType::PaymentUpdate, AgentStage::PaymentComplete, paid)
            .with_data("vendor_name", vendor)
            .with_data("amount", amount)
            .with_data("status", "succeeded"),
    ]
}

#[async_trait]
impl EventTransport for SyntheticTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Emits one scripted event per tick, then idles until an approval
    /// queues the payment script.
    async fn next_payload(&self) -> Result<Option<String>, TransportError> {
        loop {
            let has_next = !self.state.lock().await.queue.is_empty();
            if !has_next {
                self.wake.notified().await;
                continue;
            }

            tokio::time::sleep(self.tick).await;
            let mut state = self.state.lock().await;
            if let Some(mut event) = state.queue.pop_front() {
                event.timestamp = Some(Utc::now().to_rfc3339());
                let payload = serde_json::to_string(&event)
                    .map_err(|error| TransportError::Decode(error.to_string()))?;
                state.emitted.push(event);
                return Ok(Some(payload));
            }
        }
    }

    async fn fetch_recent(&self, limit: u32) -> Result<Vec<Value>, TransportError> {
        let state = self.state.lock().await;
        state
            .emitted
            .iter()
            .rev()
            .take(limit as usize)
            .map(|event| {
                serde_json::to_value(event)
                    .map_err(|error| TransportError::Decode(error.to_string()))
            })
            .collect()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl CommandTransport for SyntheticTransport {
    async fn approve_order(&self, order_id: &str) -> Result<ApproveResponse, TransportError> {
        if order_id != self.order_id {
            return Ok(ApproveResponse {
                status: "error".to_owned(),
                message: Some(format!("Order {order_id} not found")),
            });
        }

        let follow_up = {
            let mut state = self.state.lock().await;
            if state.approved {
                None
            } else {
                state.approved = true;
                state.winner.take()
            }
        };

        if let Some((vendor, unit_price)) = follow_up {
            debug!(
                event_name = "feed.synthetic.approved",
                order_id,
                vendor = %vendor,
                "queueing payment script"
            );
            self.push(payment_script(order_id, &vendor, round_cents(unit_price * 100.0))).await;
        }

        Ok(ApproveResponse {
            status: "approved".to_owned(),
            message: Some("Order approved".to_owned()),
        })
    }

    async fn trigger_test_event(&self) -> Result<Value, TransportError> {
        let probe =
            event(&self.order_id, EventType::System, AgentStage::Idle, "Synthetic test event");
        self.push(vec![probe]).await;
        Ok(json!({ "status": "sent" }))
    }
}

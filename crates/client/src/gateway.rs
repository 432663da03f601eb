use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use haggl_core::errors::ApplicationError;
use haggl_core::reconciler::{ApprovalChange, Fact};
use haggl_core::store::OrderStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::stream::TransportError;

pub const APPROVED_STATUS: &str = "approved";

/// Body of `POST /orders/approve`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn approve_order(&self, order_id: &str) -> Result<ApproveResponse, TransportError>;
    async fn trigger_test_event(&self) -> Result<Value, TransportError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("order id must not be empty")]
    MissingOrderId,
    #[error("approval for order `{0}` is already in flight")]
    AlreadyInFlight(String),
    #[error("order store has been disposed")]
    Disposed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("approval for order `{order_id}` was not accepted (status `{status}`): {message}")]
    Rejected { order_id: String, status: String, message: String },
}

impl From<CommandError> for ApplicationError {
    fn from(error: CommandError) -> Self {
        match error {
            CommandError::Transport(transport) => Self::Integration(transport.to_string()),
            CommandError::Disposed => Self::Integration(CommandError::Disposed.to_string()),
            other => Self::Rejected(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalReceipt {
    pub order_id: String,
    pub correlation_id: String,
    pub message: Option<String>,
    /// A pending approval was removed from the view by this command.
    pub removed_pending: bool,
    /// The confirmation reached the store (false when it was disposed meanwhile).
    pub folded: bool,
}

/// Issues the approve command and folds its confirmed outcome.
pub struct CommandGateway {
    transport: Arc<dyn CommandTransport>,
    store: Arc<OrderStore>,
    in_flight: Mutex<HashSet<String>>,
}

impl CommandGateway {
    pub fn new(transport: Arc<dyn CommandTransport>, store: Arc<OrderStore>) -> Self {
        Self { transport, store, in_flight: Mutex::new(HashSet::new()) }
    }

    /// Approve `order_id`. Only a response with status `approved` changes the
    /// view; everything else is reported and leaves state untouched. Never
    /// retried.
    pub async fn approve(&self, order_id: &str) -> Result<ApprovalReceipt, CommandError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(CommandError::MissingOrderId);
        }
        if self.store.is_disposed() {
            return Err(CommandError::Disposed);
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, order_id)?;
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "command.approve.requested",
            order_id,
            correlation_id = %correlation_id,
            "sending approval"
        );

        let response = match self.transport.approve_order(order_id).await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "command.approve.failed",
                    order_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "approval request failed"
                );
                return Err(error.into());
            }
        };

        if response.status != APPROVED_STATUS {
            warn!(
                event_name = "command.approve.rejected",
                order_id,
                correlation_id = %correlation_id,
                status = %response.status,
                "approval not accepted"
            );
            return Err(CommandError::Rejected {
                order_id: order_id.to_owned(),
                message: response.message.unwrap_or_else(|| "no message from server".to_owned()),
                status: response.status,
            });
        }

        let outcome = self.store.apply(Fact::ApprovalConfirmed { order_id: order_id.to_owned() });
        let folded = outcome.is_some();
        let removed_pending = outcome
            .and_then(|outcome| outcome.approval)
            .is_some_and(|change| matches!(change, ApprovalChange::Removed(_)));

        info!(
            event_name = "command.approve.confirmed",
            order_id,
            correlation_id = %correlation_id,
            removed_pending,
            folded,
            "order approved"
        );

        Ok(ApprovalReceipt {
            order_id: order_id.to_owned(),
            correlation_id,
            message: response.message,
            removed_pending,
            folded,
        })
    }

    /// Ask the backend to publish a diagnostic event.
    pub async fn trigger_test_event(&self) -> Result<Value, CommandError> {
        let response = self.transport.trigger_test_event().await.map_err(|error| {
            warn!(event_name = "command.test_event.failed", error = %error, "test event failed");
            CommandError::from(error)
        })?;
        info!(event_name = "command.test_event.sent", "diagnostic event triggered");
        Ok(response)
    }
}

struct InFlightGuard<'a> {
    registry: &'a Mutex<HashSet<String>>,
    order_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(registry: &'a Mutex<HashSet<String>>, order_id: &str) -> Result<Self, CommandError> {
        let mut in_flight = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(order_id.to_owned()) {
            return Err(CommandError::AlreadyInFlight(order_id.to_owned()));
        }
        Ok(Self { registry, order_id: order_id.to_owned() })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(&self.order_id);
    }
}

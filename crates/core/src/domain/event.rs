use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    StageChange,
    Log,
    VendorUpdate,
    CallUpdate,
    EvaluationUpdate,
    OrderUpdate,
    ApprovalRequired,
    PaymentUpdate,
    System,
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::StageChange => "stage_change",
            Self::Log => "log",
            Self::VendorUpdate => "vendor_update",
            Self::CallUpdate => "call_update",
            Self::EvaluationUpdate => "evaluation_update",
            Self::OrderUpdate => "order_update",
            Self::ApprovalRequired => "approval_required",
            Self::PaymentUpdate => "payment_update",
            Self::System => "system",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stage_change" => Self::StageChange,
            "log" => Self::Log,
            "vendor_update" => Self::VendorUpdate,
            "call_update" => Self::CallUpdate,
            "evaluation_update" => Self::EvaluationUpdate,
            "order_update" => Self::OrderUpdate,
            "approval_required" => Self::ApprovalRequired,
            "payment_update" => Self::PaymentUpdate,
            "system" => Self::System,
            _ => Self::Unknown(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained lifecycle value reported by the backend for an order.
///
/// Stages the client does not recognise are kept as [`AgentStage::Unknown`]
/// so a newer backend never causes events to be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStage {
    Idle,
    MessageReceived,
    Sourcing,
    Calling,
    Negotiating,
    Evaluating,
    Confirmed,
    ApprovalPending,
    Approved,
    Paying,
    PaymentComplete,
    Completed,
    Failed,
    Unknown(String),
}

impl AgentStage {
    pub const KNOWN: [AgentStage; 13] = [
        AgentStage::Idle,
        AgentStage::MessageReceived,
        AgentStage::Sourcing,
        AgentStage::Calling,
        AgentStage::Negotiating,
        AgentStage::Evaluating,
        AgentStage::Confirmed,
        AgentStage::ApprovalPending,
        AgentStage::Approved,
        AgentStage::Paying,
        AgentStage::PaymentComplete,
        AgentStage::Completed,
        AgentStage::Failed,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::MessageReceived => "message_received",
            Self::Sourcing => "sourcing",
            Self::Calling => "calling",
            Self::Negotiating => "negotiating",
            Self::Evaluating => "evaluating",
            Self::Confirmed => "confirmed",
            Self::ApprovalPending => "approval_pending",
            Self::Approved => "approved",
            Self::Paying => "paying",
            Self::PaymentComplete => "payment_complete",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn phase(&self) -> Phase {
        stage_to_phase(self)
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::PaymentComplete | Self::Completed)
    }
}

impl From<String> for AgentStage {
    fn from(value: String) -> Self {
        match value.as_str() {
            "idle" => Self::Idle,
            "message_received" => Self::MessageReceived,
            "sourcing" => Self::Sourcing,
            "calling" => Self::Calling,
            "negotiating" => Self::Negotiating,
            "evaluating" => Self::Evaluating,
            "confirmed" => Self::Confirmed,
            "approval_pending" => Self::ApprovalPending,
            "approved" => Self::Approved,
            "paying" => Self::Paying,
            "payment_complete" => Self::PaymentComplete,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<&str> for AgentStage {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<AgentStage> for String {
    fn from(value: AgentStage) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for AgentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse, view-facing grouping of stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Sourcing,
    Negotiating,
    Evaluating,
    Approval,
    Payment,
    Complete,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Sourcing,
        Phase::Negotiating,
        Phase::Evaluating,
        Phase::Approval,
        Phase::Payment,
        Phase::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sourcing => "sourcing",
            Self::Negotiating => "negotiating",
            Self::Evaluating => "evaluating",
            Self::Approval => "approval",
            Self::Payment => "payment",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total mapping from stage to phase. Unknown stages land in `Sourcing`.
pub fn stage_to_phase(stage: &AgentStage) -> Phase {
    match stage {
        AgentStage::Idle | AgentStage::MessageReceived | AgentStage::Sourcing => Phase::Sourcing,
        AgentStage::Calling | AgentStage::Negotiating => Phase::Negotiating,
        AgentStage::Evaluating => Phase::Evaluating,
        AgentStage::ApprovalPending | AgentStage::Confirmed => Phase::Approval,
        AgentStage::Approved | AgentStage::Paying => Phase::Payment,
        AgentStage::Completed | AgentStage::PaymentComplete | AgentStage::Failed => {
            Phase::Complete
        }
        AgentStage::Unknown(_) => Phase::Sourcing,
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event payload is empty")]
    Empty,
}

/// Immutable fact about order progress, as published on the feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<AgentStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl AgentEvent {
    pub fn new(
        event_type: EventType,
        stage: Option<AgentStage>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            stage,
            order_id: None,
            message: message.into(),
            data: Map::new(),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        if payload.trim().is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_str(payload)?)
    }

    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    /// First non-empty string found under any of `keys`. Numbers are rendered.
    pub fn data_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.data.get(*key)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    }

    /// Order the event belongs to, falling back to `data.order_id`.
    pub fn correlated_order_id(&self) -> Option<String> {
        self.order_id.clone().or_else(|| self.data_str(&["order_id"]))
    }

    pub fn data_decimal(&self, keys: &[&str]) -> Option<Decimal> {
        keys.iter().find_map(|key| decimal_from_value(self.data.get(*key)?))
    }

    pub fn data_f64(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|key| match self.data.get(*key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
    }

    /// Parsed creation time. The backend emits either RFC 3339 or a naive
    /// ISO-8601 timestamp that is implicitly UTC.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().trim_start_matches('$').to_owned(),
        _ => return None,
    };
    Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)).ok()
}

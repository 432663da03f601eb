use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::{AgentEvent, AgentStage, EventType, PendingApproval, Phase, Vendor, VendorKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn for_event(event: &AgentEvent) -> Self {
        match event.data.get("level").and_then(|level| level.as_str()) {
            Some("error") => Self::Error,
            Some("warning") => Self::Warning,
            _ if event.event_type == EventType::StageChange => Self::Info,
            _ => Self::Success,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub level: LogLevel,
    pub message: String,
    pub event_type: EventType,
    pub order_id: Option<String>,
    pub timestamp: Option<String>,
}

impl ActivityEntry {
    pub fn from_event(event: &AgentEvent) -> Self {
        Self {
            level: LogLevel::for_event(event),
            message: event.message.clone(),
            event_type: event.event_type.clone(),
            order_id: event.order_id.clone(),
            timestamp: event.timestamp.clone(),
        }
    }

    /// Two entries describe the same feed event.
    pub fn same_event(&self, other: &Self) -> bool {
        self.timestamp.is_some()
            && self.timestamp == other.timestamp
            && self.event_type == other.event_type
            && self.order_id == other.order_id
            && self.message == other.message
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    /// Set when the startup backfill could not be fetched.
    pub backfill_error: Option<String>,
}

/// Materialized view of the tracked order(s).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OrderView {
    pub phase: Phase,
    pub stage: Option<AgentStage>,
    /// Set when the last stage was `failed`; the phase is `complete` either way.
    pub failed: bool,
    pub order_id: Option<String>,
    pub vendors: Vec<Vendor>,
    pub pending_approvals: Vec<PendingApproval>,
    /// Newest first.
    pub activity: VecDeque<ActivityEntry>,
    pub selected_vendor: Option<String>,
    pub connection: ConnectionStatus,
    pub terminal_orders: BTreeSet<String>,
    /// Orders whose approval was confirmed; later replays stay cleared.
    pub resolved_approvals: BTreeSet<String>,
    pub facts_applied: u64,
}

impl OrderView {
    pub fn vendor(&self, key: &VendorKey) -> Option<&Vendor> {
        self.vendors.iter().find(|vendor| &vendor.key == key)
    }

    pub fn vendor_named(&self, name: &str) -> Option<&Vendor> {
        self.vendors.iter().find(|vendor| vendor.name == name.trim())
    }

    pub fn pending_approval(&self, order_id: &str) -> Option<&PendingApproval> {
        self.pending_approvals.iter().find(|approval| approval.order_id == order_id)
    }
}

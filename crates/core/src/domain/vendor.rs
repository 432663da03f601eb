use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::event::AgentEvent;

/// Stable synthetic identity for a vendor within an order.
///
/// The feed only carries display names, so the key is derived from the
/// order id and the trimmed name. Two vendors with the same name on
/// different orders never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorKey(pub String);

impl VendorKey {
    pub fn derive(order_id: Option<&str>, vendor_name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(order_id.unwrap_or_default().as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(vendor_name.trim().as_bytes());
        let digest = hasher.finalize().to_hex();
        Self(format!("vnd-{}", &digest.as_str()[..16]))
    }
}

impl fmt::Display for VendorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorStatus {
    Found,
    Calling,
    Talking,
    Answered,
    Declined,
    Voicemail,
    Negotiated,
    Completed,
}

impl VendorStatus {
    /// Translate a call provider status. Anything unrecognised yields `None`
    /// and must leave the existing status untouched.
    pub fn from_call_status(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "initiated" => Some(Self::Calling),
            "completed" => Some(Self::Answered),
            "failed" => Some(Self::Declined),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Calling => "calling",
            Self::Talking => "talking",
            Self::Answered => "answered",
            Self::Declined => "declined",
            Self::Voicemail => "voicemail",
            Self::Negotiated => "negotiated",
            Self::Completed => "completed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub key: VendorKey,
    pub name: String,
    pub order_id: Option<String>,
    pub status: VendorStatus,
    pub discount: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub transcript: Option<String>,
    pub final_score: Option<f64>,
}

/// Partial vendor update extracted from a feed event. `None` fields are
/// absent from the update and must not overwrite existing values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VendorPatch {
    pub name: String,
    pub order_id: Option<String>,
    pub status: Option<VendorStatus>,
    pub discount: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub transcript: Option<String>,
    pub final_score: Option<f64>,
}

impl VendorPatch {
    /// Build a patch from a `call_update` event, translating the call status.
    pub fn from_call_update(event: &AgentEvent) -> Option<Self> {
        let mut patch = Self::from_event_fields(event)?;
        patch.status = event
            .data_str(&["status", "call_status"])
            .and_then(|raw| VendorStatus::from_call_status(&raw));
        Some(patch)
    }

    /// Build a patch from a `vendor_update` event. No status translation.
    pub fn from_vendor_update(event: &AgentEvent) -> Option<Self> {
        Self::from_event_fields(event)
    }

    fn from_event_fields(event: &AgentEvent) -> Option<Self> {
        let name = event.data_str(&["vendor_name", "vendor"])?;
        Some(Self {
            name,
            order_id: event.order_id.clone(),
            status: None,
            discount: event.data_decimal(&["discount"]),
            price_per_unit: event.data_decimal(&["price_per_unit", "price"]),
            transcript: event.data_str(&["transcript"]),
            final_score: event.data_f64(&["final_score"]),
        })
    }

    pub fn key(&self) -> VendorKey {
        VendorKey::derive(self.order_id.as_deref(), &self.name)
    }

    pub fn into_vendor(self, default_status: VendorStatus) -> Vendor {
        Vendor {
            key: self.key(),
            status: self.status.unwrap_or(default_status),
            name: self.name,
            order_id: self.order_id,
            discount: self.discount,
            price_per_unit: self.price_per_unit,
            transcript: self.transcript,
            final_score: self.final_score,
        }
    }
}

impl Vendor {
    pub fn merge(&mut self, patch: VendorPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if patch.discount.is_some() {
            self.discount = patch.discount;
        }
        if patch.price_per_unit.is_some() {
            self.price_per_unit = patch.price_per_unit;
        }
        if patch.transcript.is_some() {
            self.transcript = patch.transcript;
        }
        if patch.final_score.is_some() {
            self.final_score = patch.final_score;
        }
    }
}

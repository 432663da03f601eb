use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::event::AgentEvent;

/// An order waiting on the operator. At most one exists per `order_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub order_id: String,
    pub vendor_name: String,
    pub product: String,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub requested_at: Option<String>,
}

impl PendingApproval {
    /// Build from an `approval_required` event. Returns `None` when the event
    /// cannot be correlated to an order.
    pub fn from_event(event: &AgentEvent) -> Option<Self> {
        let order_id = event.correlated_order_id()?;
        Some(Self {
            order_id,
            vendor_name: event.data_str(&["vendor_name", "vendor"]).unwrap_or_default(),
            product: event.data_str(&["product"]).unwrap_or_default(),
            quantity: event.data_decimal(&["quantity"]).unwrap_or(Decimal::ZERO),
            unit: event.data_str(&["unit"]).unwrap_or_default(),
            price: event.data_decimal(&["price", "price_per_unit"]).unwrap_or(Decimal::ZERO),
            requested_at: event.timestamp.clone(),
        })
    }

    pub fn total(&self) -> Decimal {
        self.price * self.quantity
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payment::PaymentMethod;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl SaleStatus {
    /// Cancelled and Refunded are terminal; Paid may still be refunded
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Cancelled | SaleStatus::Refunded)
    }
}

/// One attempt to acquire `quantity` tickets of a single event.
///
/// `total_cents` is a snapshot of the event price at creation and never
/// changes afterwards, even if the event is repriced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub method: PaymentMethod,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub fn new(
        event_id: Uuid,
        user_id: Uuid,
        quantity: u32,
        unit_price_cents: i64,
        method: PaymentMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            quantity,
            unit_price_cents,
            total_cents: unit_price_cents * quantity as i64,
            method,
            status: SaleStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

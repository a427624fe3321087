use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Transfer,
    Cash,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Completed may still be refunded; Failed and Refunded never move again
    pub fn is_active(&self) -> bool {
        !matches!(self, PaymentStatus::Failed)
    }
}

/// Raw card input as submitted by the buyer. Never persisted as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub holder: String,
    /// MM/YY
    pub expiry: String,
    pub cvv: String,
}

/// One settlement attempt for exactly one sale.
///
/// A sale has at most one payment that is not Failed; a failed attempt
/// may be retried with a fresh record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub gateway_response: Value,
    /// First and last four digits visible, middle masked
    pub card_number: Option<String>,
    pub card_holder: Option<String>,
    pub card_expiry: Option<String>,
    pub transfer_key: Option<String>,
    pub transfer_payload: Option<String>,
    pub qr_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(sale_id: Uuid, method: PaymentMethod, amount_cents: i64, transaction_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sale_id,
            method,
            amount_cents,
            status: PaymentStatus::Pending,
            transaction_id,
            gateway_response: Value::Null,
            card_number: None,
            card_holder: None,
            card_expiry: None,
            transfer_key: None,
            transfer_payload: None,
            qr_code: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }
}

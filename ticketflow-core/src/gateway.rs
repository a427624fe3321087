use async_trait::async_trait;

use crate::payment::{CardDetails, PaymentMethod};

/// Outcome of a synchronous charge authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Approved { reference: String },
    Declined { reason: String },
}

/// Outcome of a transfer confirmation poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPoll {
    Confirmed,
    Pending,
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway timed out")]
    Timeout,

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// External payment authorization collaborator.
///
/// The engine only depends on this three-outcome contract; production
/// providers and deterministic test doubles satisfy the same trait.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a charge for synchronous authorization
    async fn authorize(
        &self,
        amount_cents: i64,
        method: PaymentMethod,
        card: &CardDetails,
    ) -> Result<Authorization, GatewayError>;

    /// Ask whether an out-of-band transfer has been confirmed
    async fn poll_transfer(&self, transaction_id: &str) -> Result<TransferPoll, GatewayError>;
}

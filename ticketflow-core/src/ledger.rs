use async_trait::async_trait;
use uuid::Uuid;

use crate::event::TicketEvent;
use crate::payment::{Payment, PaymentStatus};
use crate::sale::{Sale, SaleStatus};

/// A record paired with its store version, for compare-and-swap writes
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger backend error: {0}")]
    Backend(String),

    #[error("Duplicate record: {0}")]
    Duplicate(Uuid),
}

/// Durable record of events, sales and payments.
///
/// This is the engine's only shared mutable state. Event writes go through
/// versioned compare-and-swap; sale and payment writes go through
/// status-guarded transitions, so concurrent mutations of the same record
/// serialize here rather than in the callers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_event(&self, event: &TicketEvent) -> Result<(), LedgerError>;

    async fn load_event(&self, id: Uuid) -> Result<Option<Versioned<TicketEvent>>, LedgerError>;

    /// Write `event` only if the stored version still equals
    /// `expected_version`. Returns false when the caller lost the race.
    async fn store_event(
        &self,
        event: &TicketEvent,
        expected_version: u64,
    ) -> Result<bool, LedgerError>;

    async fn insert_sale(&self, sale: &Sale) -> Result<(), LedgerError>;

    async fn load_sale(&self, id: Uuid) -> Result<Option<Sale>, LedgerError>;

    /// Write `sale` only if the stored status still equals `expected`
    async fn transition_sale(&self, sale: &Sale, expected: SaleStatus) -> Result<bool, LedgerError>;

    async fn delete_sale(&self, id: Uuid) -> Result<(), LedgerError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), LedgerError>;

    /// Insert unless the sale already has a non-Failed payment. The check
    /// and the insert run as one atomic step; on rejection the existing
    /// active payment is returned instead.
    async fn insert_payment_if_no_active(
        &self,
        payment: &Payment,
    ) -> Result<Option<Payment>, LedgerError>;

    async fn load_payment(&self, id: Uuid) -> Result<Option<Payment>, LedgerError>;

    /// Write `payment` only if the stored status still equals `expected`
    async fn transition_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, LedgerError>;

    /// Any payment for this sale that is not Failed
    async fn active_payment_for_sale(&self, sale_id: Uuid) -> Result<Option<Payment>, LedgerError>;

    /// Pending transfer payments, the confirmation poller's work queue
    async fn pending_transfer_payments(&self) -> Result<Vec<Payment>, LedgerError>;
}

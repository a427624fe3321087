use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use ticketflow_core::ledger::{LedgerError, LedgerStore, Versioned};
use ticketflow_core::payment::{Payment, PaymentMethod, PaymentStatus};
use ticketflow_core::sale::{Sale, SaleStatus};
use ticketflow_core::TicketEvent;

/// In-memory ledger with per-record versioning.
///
/// Events carry a version counter bumped on every write, so callers can
/// run optimistic compare-and-swap loops over the counts. Sales and
/// payments are written through status guards instead, which is the same
/// discipline a SQL backend gets from `UPDATE .. WHERE status = $expected`.
pub struct MemoryLedger {
    events: RwLock<HashMap<Uuid, Versioned<TicketEvent>>>,
    sales: RwLock<HashMap<Uuid, Sale>>,
    payments: RwLock<HashMap<Uuid, Payment>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            sales: RwLock::new(HashMap::new()),
            payments: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_event(&self, event: &TicketEvent) -> Result<(), LedgerError> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(LedgerError::Duplicate(event.id));
        }
        events.insert(event.id, Versioned { value: event.clone(), version: 0 });
        Ok(())
    }

    async fn load_event(&self, id: Uuid) -> Result<Option<Versioned<TicketEvent>>, LedgerError> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn store_event(
        &self,
        event: &TicketEvent,
        expected_version: u64,
    ) -> Result<bool, LedgerError> {
        let mut events = self.events.write().await;
        let entry = events
            .get_mut(&event.id)
            .ok_or_else(|| LedgerError::Backend(format!("event {} vanished", event.id)))?;

        if entry.version != expected_version {
            return Ok(false);
        }

        entry.value = event.clone();
        entry.version += 1;
        Ok(true)
    }

    async fn insert_sale(&self, sale: &Sale) -> Result<(), LedgerError> {
        let mut sales = self.sales.write().await;
        if sales.contains_key(&sale.id) {
            return Err(LedgerError::Duplicate(sale.id));
        }
        sales.insert(sale.id, sale.clone());
        Ok(())
    }

    async fn load_sale(&self, id: Uuid) -> Result<Option<Sale>, LedgerError> {
        Ok(self.sales.read().await.get(&id).cloned())
    }

    async fn transition_sale(&self, sale: &Sale, expected: SaleStatus) -> Result<bool, LedgerError> {
        let mut sales = self.sales.write().await;
        let entry = sales
            .get_mut(&sale.id)
            .ok_or_else(|| LedgerError::Backend(format!("sale {} vanished", sale.id)))?;

        if entry.status != expected {
            return Ok(false);
        }

        *entry = sale.clone();
        Ok(true)
    }

    async fn delete_sale(&self, id: Uuid) -> Result<(), LedgerError> {
        self.sales.write().await.remove(&id);
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), LedgerError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(LedgerError::Duplicate(payment.id));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn insert_payment_if_no_active(
        &self,
        payment: &Payment,
    ) -> Result<Option<Payment>, LedgerError> {
        let mut payments = self.payments.write().await;
        if let Some(existing) = payments
            .values()
            .find(|p| p.sale_id == payment.sale_id && p.status.is_active())
        {
            return Ok(Some(existing.clone()));
        }
        if payments.contains_key(&payment.id) {
            return Err(LedgerError::Duplicate(payment.id));
        }
        payments.insert(payment.id, payment.clone());
        Ok(None)
    }

    async fn load_payment(&self, id: Uuid) -> Result<Option<Payment>, LedgerError> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn transition_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, LedgerError> {
        let mut payments = self.payments.write().await;
        let entry = payments
            .get_mut(&payment.id)
            .ok_or_else(|| LedgerError::Backend(format!("payment {} vanished", payment.id)))?;

        if entry.status != expected {
            return Ok(false);
        }

        *entry = payment.clone();
        Ok(true)
    }

    async fn active_payment_for_sale(&self, sale_id: Uuid) -> Result<Option<Payment>, LedgerError> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.sale_id == sale_id && p.status.is_active())
            .cloned())
    }

    async fn pending_transfer_payments(&self) -> Result<Vec<Payment>, LedgerError> {
        let payments = self.payments.read().await;
        let mut pending: Vec<Payment> = payments
            .values()
            .filter(|p| p.method == PaymentMethod::Transfer && p.status == PaymentStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ticketflow_core::PaymentMethod;

    fn sample_event() -> TicketEvent {
        let now = Utc::now();
        TicketEvent::new(
            "Warehouse Rave".to_string(),
            3_000,
            50,
            now - Duration::hours(1),
            now + Duration::hours(1),
            now + Duration::hours(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_event_cas_rejects_stale_version() {
        let ledger = MemoryLedger::new();
        let event = sample_event();
        ledger.insert_event(&event).await.unwrap();

        let loaded = ledger.load_event(event.id).await.unwrap().unwrap();
        let mut first = loaded.value.clone();
        first.available -= 1;
        assert!(ledger.store_event(&first, loaded.version).await.unwrap());

        // Second writer is still holding version 0
        let mut second = loaded.value;
        second.available -= 1;
        assert!(!ledger.store_event(&second, loaded.version).await.unwrap());
    }

    #[tokio::test]
    async fn test_sale_transition_guarded_by_status() {
        let ledger = MemoryLedger::new();
        let event = sample_event();
        let mut sale = Sale::new(event.id, Uuid::new_v4(), 1, 3_000, PaymentMethod::Transfer);
        ledger.insert_sale(&sale).await.unwrap();

        sale.status = SaleStatus::Paid;
        assert!(ledger.transition_sale(&sale, SaleStatus::Pending).await.unwrap());

        // Stored status is Paid now, a second Pending-guarded write loses
        sale.status = SaleStatus::Cancelled;
        assert!(!ledger.transition_sale(&sale, SaleStatus::Pending).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_payment_ignores_failed_attempts() {
        let ledger = MemoryLedger::new();
        let sale_id = Uuid::new_v4();

        let mut failed = Payment::new(sale_id, PaymentMethod::CreditCard, 3_000, "TXN1".into());
        failed.status = PaymentStatus::Failed;
        ledger.insert_payment(&failed).await.unwrap();
        assert!(ledger.active_payment_for_sale(sale_id).await.unwrap().is_none());

        let pending = Payment::new(sale_id, PaymentMethod::Transfer, 3_000, "PIX1".into());
        ledger.insert_payment(&pending).await.unwrap();
        let active = ledger.active_payment_for_sale(sale_id).await.unwrap().unwrap();
        assert_eq!(active.id, pending.id);
    }

    #[tokio::test]
    async fn test_guarded_insert_admits_one_active_payment_per_sale() {
        let ledger = MemoryLedger::new();
        let sale_id = Uuid::new_v4();

        let first = Payment::new(sale_id, PaymentMethod::Transfer, 3_000, "PIX1".into());
        assert!(ledger.insert_payment_if_no_active(&first).await.unwrap().is_none());

        // Second active attempt bounces off the stored one
        let second = Payment::new(sale_id, PaymentMethod::CreditCard, 3_000, "TXN1".into());
        let rejected = ledger.insert_payment_if_no_active(&second).await.unwrap().unwrap();
        assert_eq!(rejected.id, first.id);
        assert!(ledger.load_payment(second.id).await.unwrap().is_none());

        // Once the first attempt fails, a retry is admitted
        let mut failed = first.clone();
        failed.status = PaymentStatus::Failed;
        assert!(ledger.transition_payment(&failed, PaymentStatus::Pending).await.unwrap());
        assert!(ledger.insert_payment_if_no_active(&second).await.unwrap().is_none());
    }
}

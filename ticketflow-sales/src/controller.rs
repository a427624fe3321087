use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use ticketflow_core::ledger::{LedgerError, LedgerStore};
use ticketflow_core::payment::{Payment, PaymentMethod, PaymentStatus};
use ticketflow_core::sale::{Sale, SaleStatus};
use ticketflow_core::TicketEvent;
use ticketflow_inventory::{InventoryError, InventoryManager};

pub const MAX_TICKETS_PER_SALE: u32 = 10;

#[derive(Debug, Clone)]
pub struct NewSale {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub quantity: u32,
    pub method: PaymentMethod,
}

/// Drives the sale state machine: `Pending -> {Paid, Cancelled}`,
/// `Paid -> Refunded`.
///
/// Stateless over the ledger; transitions are status-guarded writes, so
/// two concurrent transitions on the same sale resolve to exactly one
/// winner and every inventory effect happens at most once.
pub struct SaleController {
    ledger: Arc<dyn LedgerStore>,
    inventory: InventoryManager,
    max_quantity: u32,
}

impl SaleController {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self::with_max_quantity(ledger, MAX_TICKETS_PER_SALE)
    }

    pub fn with_max_quantity(ledger: Arc<dyn LedgerStore>, max_quantity: u32) -> Self {
        let inventory = InventoryManager::new(ledger.clone());
        Self { ledger, inventory, max_quantity }
    }

    pub fn inventory(&self) -> &InventoryManager {
        &self.inventory
    }

    pub async fn get(&self, sale_id: Uuid) -> Result<Sale, SaleError> {
        self.ledger
            .load_sale(sale_id)
            .await?
            .ok_or_else(|| SaleError::NotFound(sale_id.to_string()))
    }

    /// Accept a sale: price is snapshotted, capacity is reserved, and the
    /// sale is persisted as Pending awaiting settlement.
    pub async fn create_sale(&self, request: NewSale) -> Result<Sale, SaleError> {
        let event = self.validate_and_reserve(&request).await?;

        let sale = Sale::new(
            request.event_id,
            request.user_id,
            request.quantity,
            event.price_cents,
            request.method,
        );

        if let Err(err) = self.ledger.insert_sale(&sale).await {
            // Give the earmarked tickets back before surfacing the fault
            self.inventory.release(request.event_id, request.quantity).await?;
            return Err(err.into());
        }

        info!(sale_id = %sale.id, event_id = %sale.event_id, quantity = sale.quantity, "sale created");
        Ok(sale)
    }

    /// Accept a sale settled out of band (cash at the door): the
    /// reservation is committed immediately and the sale lands as Paid.
    pub async fn create_presettled_sale(&self, request: NewSale) -> Result<Sale, SaleError> {
        let event = self.validate_and_reserve(&request).await?;

        let mut sale = Sale::new(
            request.event_id,
            request.user_id,
            request.quantity,
            event.price_cents,
            request.method,
        );
        sale.status = SaleStatus::Paid;

        if let Err(err) = self.ledger.insert_sale(&sale).await {
            self.inventory.release(request.event_id, request.quantity).await?;
            return Err(err.into());
        }
        self.inventory.commit(request.event_id, request.quantity).await?;

        // The sale is born Paid, so it gets a settled payment record too.
        let mut payment = Payment::new(
            sale.id,
            request.method,
            sale.total_cents,
            format!("CSH{}", Uuid::new_v4().simple()),
        );
        payment.status = PaymentStatus::Completed;
        payment.gateway_response = json!({ "status": "approved", "status_code": 200 });
        self.ledger.insert_payment(&payment).await?;

        info!(sale_id = %sale.id, event_id = %sale.event_id, "pre-settled sale created");
        Ok(sale)
    }

    /// Settle the sale after a successful payment. Calling on an
    /// already-Paid sale is a no-op and never commits twice.
    pub async fn mark_paid(&self, sale_id: Uuid) -> Result<Sale, SaleError> {
        loop {
            let sale = self.get(sale_id).await?;
            match sale.status {
                SaleStatus::Paid => return Ok(sale),
                SaleStatus::Pending => {}
                other => {
                    return Err(SaleError::InvalidTransition {
                        from: format!("{other:?}"),
                        to: "Paid".to_string(),
                    })
                }
            }

            let mut updated = sale.clone();
            updated.status = SaleStatus::Paid;
            if self.ledger.transition_sale(&updated, SaleStatus::Pending).await? {
                self.inventory.commit(sale.event_id, sale.quantity).await?;
                info!(sale_id = %sale_id, "sale paid");
                return Ok(updated);
            }
            // Someone raced us; reloop to observe the new status
        }
    }

    /// Abandon a pending sale, returning its reservation to availability
    pub async fn cancel(&self, sale_id: Uuid) -> Result<Sale, SaleError> {
        let sale = self.get(sale_id).await?;
        if sale.status != SaleStatus::Pending {
            return Err(SaleError::InvalidTransition {
                from: format!("{:?}", sale.status),
                to: "Cancelled".to_string(),
            });
        }

        let mut updated = sale.clone();
        updated.status = SaleStatus::Cancelled;
        if !self.ledger.transition_sale(&updated, SaleStatus::Pending).await? {
            let current = self.get(sale_id).await?;
            return Err(SaleError::InvalidTransition {
                from: format!("{:?}", current.status),
                to: "Cancelled".to_string(),
            });
        }

        self.inventory.release(sale.event_id, sale.quantity).await?;
        info!(sale_id = %sale_id, "sale cancelled");
        Ok(updated)
    }

    /// Reverse a paid sale: sold tickets go back on sale
    pub async fn refund(&self, sale_id: Uuid) -> Result<Sale, SaleError> {
        let sale = self.get(sale_id).await?;
        if sale.status != SaleStatus::Paid {
            return Err(SaleError::InvalidTransition {
                from: format!("{:?}", sale.status),
                to: "Refunded".to_string(),
            });
        }

        let mut updated = sale.clone();
        updated.status = SaleStatus::Refunded;
        if !self.ledger.transition_sale(&updated, SaleStatus::Paid).await? {
            let current = self.get(sale_id).await?;
            return Err(SaleError::InvalidTransition {
                from: format!("{:?}", current.status),
                to: "Refunded".to_string(),
            });
        }

        self.inventory.release_sold(sale.event_id, sale.quantity).await?;
        info!(sale_id = %sale_id, "sale refunded");
        Ok(updated)
    }

    /// Remove a sale record. Pending sales give their reservation back,
    /// paid sales are reversed as a refund would be, and a sale whose
    /// completed payment has not been refunded cannot be deleted.
    ///
    /// The inventory reversal runs behind a won status transition, so a
    /// delete racing a cancel (or a second delete) releases at most once.
    pub async fn delete(&self, sale_id: Uuid) -> Result<(), SaleError> {
        loop {
            let sale = self.get(sale_id).await?;

            if let Some(payment) = self.ledger.active_payment_for_sale(sale_id).await? {
                if payment.status == PaymentStatus::Completed {
                    return Err(SaleError::HasCompletedPayment(payment.id));
                }
            }

            match sale.status {
                SaleStatus::Cancelled | SaleStatus::Refunded => break,
                SaleStatus::Pending => {
                    let mut updated = sale.clone();
                    updated.status = SaleStatus::Cancelled;
                    if self.ledger.transition_sale(&updated, SaleStatus::Pending).await? {
                        self.inventory.release(sale.event_id, sale.quantity).await?;
                        break;
                    }
                }
                SaleStatus::Paid => {
                    let mut updated = sale.clone();
                    updated.status = SaleStatus::Refunded;
                    if self.ledger.transition_sale(&updated, SaleStatus::Paid).await? {
                        self.inventory.release_sold(sale.event_id, sale.quantity).await?;
                        break;
                    }
                }
            }
            // Lost the guard to a concurrent transition; reload and redo
        }

        self.ledger.delete_sale(sale_id).await?;
        info!(sale_id = %sale_id, "sale deleted");
        Ok(())
    }

    async fn validate_and_reserve(&self, request: &NewSale) -> Result<TicketEvent, SaleError> {
        if request.quantity == 0 || request.quantity > self.max_quantity {
            return Err(SaleError::InvalidQuantity {
                quantity: request.quantity,
                max: self.max_quantity,
            });
        }

        let event = self
            .inventory
            .get(request.event_id)
            .await?
            .ok_or_else(|| SaleError::EventNotFound(request.event_id.to_string()))?;

        if !event.sales_open_at(Utc::now()) {
            return Err(SaleError::SalesWindowClosed);
        }

        self.inventory.reserve(request.event_id, request.quantity).await?;
        Ok(event)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SaleError {
    #[error("Sale not found: {0}")]
    NotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Sales window is closed for this event")]
    SalesWindowClosed,

    #[error("Quantity must be between 1 and {max}, got {quantity}")]
    InvalidQuantity { quantity: u32, max: u32 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Sale still has a completed payment: {0}")]
    HasCompletedPayment(Uuid),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ticketflow_core::TicketEvent;
    use ticketflow_store::MemoryLedger;

    fn controller() -> SaleController {
        SaleController::new(Arc::new(MemoryLedger::new()))
    }

    async fn seeded_event(controller: &SaleController, capacity: u32) -> TicketEvent {
        let now = Utc::now();
        let event = TicketEvent::new(
            "Open Air Festival".to_string(),
            8_000,
            capacity,
            now - Duration::hours(1),
            now + Duration::days(7),
            now + Duration::days(8),
        )
        .unwrap();
        controller.inventory().initialize(event).await.unwrap()
    }

    fn request(event_id: Uuid, quantity: u32) -> NewSale {
        NewSale {
            event_id,
            user_id: Uuid::new_v4(),
            quantity,
            method: PaymentMethod::CreditCard,
        }
    }

    #[tokio::test]
    async fn test_create_sale_reserves_and_snapshots_price() {
        let controller = controller();
        let event = seeded_event(&controller, 100).await;

        let sale = controller.create_sale(request(event.id, 4)).await.unwrap();
        assert_eq!(sale.status, SaleStatus::Pending);
        assert_eq!(sale.total_cents, 32_000);

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.available, 96);
        assert_eq!(event.reserved, 4);
        assert_eq!(event.sold, 0);
    }

    #[tokio::test]
    async fn test_create_sale_rejects_bad_quantity() {
        let controller = controller();
        let event = seeded_event(&controller, 100).await;

        assert!(matches!(
            controller.create_sale(request(event.id, 0)).await,
            Err(SaleError::InvalidQuantity { quantity: 0, .. })
        ));
        assert!(matches!(
            controller.create_sale(request(event.id, 11)).await,
            Err(SaleError::InvalidQuantity { quantity: 11, .. })
        ));
    }

    #[tokio::test]
    async fn test_create_sale_outside_window_fails() {
        let controller = controller();
        let now = Utc::now();
        let event = TicketEvent::new(
            "Closed Show".to_string(),
            8_000,
            50,
            now - Duration::days(10),
            now - Duration::days(1),
            now + Duration::days(1),
        )
        .unwrap();
        let event = controller.inventory().initialize(event).await.unwrap();

        assert!(matches!(
            controller.create_sale(request(event.id, 1)).await,
            Err(SaleError::SalesWindowClosed)
        ));
    }

    #[tokio::test]
    async fn test_create_sale_propagates_capacity_exhaustion() {
        let controller = controller();
        let event = seeded_event(&controller, 1).await;

        controller.create_sale(request(event.id, 1)).await.unwrap();
        let err = controller.create_sale(request(event.id, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            SaleError::Inventory(InventoryError::InsufficientCapacity { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_paid_commits_once() {
        let controller = controller();
        let event = seeded_event(&controller, 10).await;
        let sale = controller.create_sale(request(event.id, 2)).await.unwrap();

        let paid = controller.mark_paid(sale.id).await.unwrap();
        assert_eq!(paid.status, SaleStatus::Paid);

        // Idempotent: a second call must not double-commit
        controller.mark_paid(sale.id).await.unwrap();

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.sold, 2);
        assert_eq!(event.available, 8);
        assert!(event.counts_consistent());
    }

    #[tokio::test]
    async fn test_cancel_returns_reservation() {
        let controller = controller();
        let event = seeded_event(&controller, 10).await;
        let sale = controller.create_sale(request(event.id, 3)).await.unwrap();

        let cancelled = controller.cancel(sale.id).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.available, 10);
        assert_eq!(event.sold, 0);

        // Terminal: cannot pay or re-cancel
        assert!(matches!(
            controller.mark_paid(sale.id).await,
            Err(SaleError::InvalidTransition { .. })
        ));
        assert!(matches!(
            controller.cancel(sale.id).await,
            Err(SaleError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_refund_round_trip_restores_counts() {
        let controller = controller();
        let event = seeded_event(&controller, 10).await;
        let sale = controller.create_sale(request(event.id, 4)).await.unwrap();
        controller.mark_paid(sale.id).await.unwrap();

        let refunded = controller.refund(sale.id).await.unwrap();
        assert_eq!(refunded.status, SaleStatus::Refunded);

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.available, 10);
        assert_eq!(event.reserved, 0);
        assert_eq!(event.sold, 0);
    }

    #[tokio::test]
    async fn test_refund_requires_paid() {
        let controller = controller();
        let event = seeded_event(&controller, 10).await;
        let sale = controller.create_sale(request(event.id, 1)).await.unwrap();

        assert!(matches!(
            controller.refund(sale.id).await,
            Err(SaleError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_presettled_sale_lands_paid_with_committed_inventory() {
        let ledger: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let controller = SaleController::new(ledger.clone());
        let event = seeded_event(&controller, 10).await;

        let mut req = request(event.id, 2);
        req.method = PaymentMethod::Cash;
        let sale = controller.create_presettled_sale(req).await.unwrap();
        assert_eq!(sale.status, SaleStatus::Paid);

        let payment = ledger
            .active_payment_for_sale(sale.id)
            .await
            .unwrap()
            .expect("pre-settled sale must carry its payment");
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.method, PaymentMethod::Cash);
        assert_eq!(payment.amount_cents, sale.total_cents);

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.sold, 2);
        assert_eq!(event.available, 8);
        assert!(event.counts_consistent());
    }

    #[tokio::test]
    async fn test_racing_cancel_and_delete_release_reservation_once() {
        for _ in 0..20 {
            let controller = Arc::new(controller());
            let event = seeded_event(&controller, 10).await;
            let doomed = controller.create_sale(request(event.id, 2)).await.unwrap();
            let bystander = controller.create_sale(request(event.id, 2)).await.unwrap();

            let canceller = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.cancel(doomed.id).await })
            };
            let deleter = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.delete(doomed.id).await })
            };
            // One side may lose the race and report the losing status; the
            // reservation must come back exactly once either way.
            let _ = canceller.await.unwrap();
            let _ = deleter.await.unwrap();

            let event = controller.inventory().get(event.id).await.unwrap().unwrap();
            assert_eq!(event.available, 8);
            assert_eq!(event.reserved, 2);
            assert_eq!(event.sold, 0);
            assert!(event.counts_consistent());

            let remaining = controller.get(bystander.id).await.unwrap();
            assert_eq!(remaining.status, SaleStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_delete_pending_sale_releases_reservation() {
        let controller = controller();
        let event = seeded_event(&controller, 10).await;
        let sale = controller.create_sale(request(event.id, 5)).await.unwrap();

        controller.delete(sale.id).await.unwrap();
        assert!(matches!(controller.get(sale.id).await, Err(SaleError::NotFound(_))));

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.available, 10);
    }

    #[tokio::test]
    async fn test_delete_paid_sale_reverses_inventory() {
        let controller = controller();
        let event = seeded_event(&controller, 10).await;
        let sale = controller.create_sale(request(event.id, 2)).await.unwrap();
        controller.mark_paid(sale.id).await.unwrap();

        controller.delete(sale.id).await.unwrap();

        let event = controller.inventory().get(event.id).await.unwrap().unwrap();
        assert_eq!(event.available, 10);
        assert_eq!(event.sold, 0);
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use ticketflow_core::ledger::{LedgerError, LedgerStore};
use ticketflow_core::payment::{CardDetails, Payment, PaymentMethod, PaymentStatus};
use ticketflow_core::sale::{Sale, SaleStatus};
use ticketflow_core::{Authorization, PaymentGateway, TransferPoll};
use ticketflow_inventory::InventoryError;
use ticketflow_sales::{SaleController, SaleError};
use ticketflow_store::{BusinessRules, MerchantConfig};

use crate::card::{self, CardError};
use crate::transfer::{self, TransferRequest};

/// Drives the payment state machine and reconciles outcomes into the
/// sale lifecycle: `Pending -> {Completed, Failed}`,
/// `Completed -> Refunded`.
///
/// Card charges resolve synchronously against the gateway; transfer
/// payments stay Pending until a confirmation poll or their expiry.
pub struct PaymentController {
    ledger: Arc<dyn LedgerStore>,
    sales: SaleController,
    gateway: Arc<dyn PaymentGateway>,
    rules: BusinessRules,
    merchant: MerchantConfig,
}

impl PaymentController {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        rules: BusinessRules,
        merchant: MerchantConfig,
    ) -> Self {
        let sales = SaleController::with_max_quantity(ledger.clone(), rules.max_tickets_per_sale);
        Self { ledger, sales, gateway, rules, merchant }
    }

    pub fn sales(&self) -> &SaleController {
        &self.sales
    }

    pub async fn get(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        self.ledger
            .load_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))
    }

    /// Any non-failed payment attempt currently attached to the sale
    pub async fn payment_for_sale(&self, sale_id: Uuid) -> Result<Option<Payment>, PaymentError> {
        Ok(self.ledger.active_payment_for_sale(sale_id).await?)
    }

    /// The confirmation poller's work queue
    pub async fn pending_transfers(&self) -> Result<Vec<Payment>, PaymentError> {
        Ok(self.ledger.pending_transfer_payments().await?)
    }

    /// Charge a card synchronously. Approval settles the sale; a decline
    /// records a Failed attempt and leaves the sale Pending with its
    /// reservation intact so the buyer can retry.
    pub async fn pay_by_card(
        &self,
        sale_id: Uuid,
        details: CardDetails,
        is_credit: bool,
    ) -> Result<Payment, PaymentError> {
        let sale = self.payable_sale(sale_id).await?;
        let validated = card::validate(&details)?;

        let method = if is_credit { PaymentMethod::CreditCard } else { PaymentMethod::DebitCard };
        let mut payment = Payment::new(
            sale_id,
            method,
            sale.total_cents,
            transfer::transaction_id("TXN"),
        );
        payment.card_number = Some(card::mask_number(&validated.number));
        payment.card_holder = Some(validated.holder);
        payment.card_expiry = Some(validated.expiry);

        let timeout = Duration::from_secs(self.rules.gateway_timeout_seconds);
        let outcome =
            tokio::time::timeout(timeout, self.gateway.authorize(sale.total_cents, method, &details))
                .await;

        // Fail-closed: timeouts and gateway faults decline the charge
        match outcome {
            Ok(Ok(Authorization::Approved { reference })) => {
                payment.status = PaymentStatus::Completed;
                payment.gateway_response =
                    json!({ "status": "approved", "code": "200", "reference": reference });
            }
            Ok(Ok(Authorization::Declined { reason })) => {
                payment.status = PaymentStatus::Failed;
                payment.gateway_response =
                    json!({ "status": "declined", "code": "400", "reason": reason });
            }
            Ok(Err(err)) => {
                warn!(sale_id = %sale_id, error = %err, "card authorization failed at the gateway");
                payment.status = PaymentStatus::Failed;
                payment.gateway_response =
                    json!({ "status": "declined", "code": "502", "reason": err.to_string() });
            }
            Err(_) => {
                warn!(sale_id = %sale_id, "card authorization timed out");
                payment.status = PaymentStatus::Failed;
                payment.gateway_response =
                    json!({ "status": "declined", "code": "504", "reason": "gateway timeout" });
            }
        }

        if let Some(existing) = self.ledger.insert_payment_if_no_active(&payment).await? {
            return Err(PaymentError::PaymentAlreadyExists(existing.id));
        }
        if payment.status == PaymentStatus::Completed {
            self.sales.mark_paid(sale_id).await?;
        }

        info!(
            payment_id = %payment.id,
            sale_id = %sale_id,
            status = ?payment.status,
            "card payment processed"
        );
        Ok(payment)
    }

    /// Issue a transfer payment: payload and scannable code are generated
    /// up front, the payment sits Pending until confirmed or expired.
    /// Inventory is untouched; the sale already holds its reservation.
    pub async fn generate_transfer_payment(
        &self,
        sale_id: Uuid,
        key: Option<String>,
    ) -> Result<Payment, PaymentError> {
        let sale = self.payable_sale(sale_id).await?;

        let description = match self.sales.inventory().get(sale.event_id).await? {
            Some(event) => format!("Ticket: {}", event.description),
            None => "Ticket".to_string(),
        };

        let request = TransferRequest {
            key: key.unwrap_or_else(transfer::generate_key),
            amount_cents: sale.total_cents,
            transaction_id: transfer::transaction_id("PIX"),
            description,
            merchant: self.merchant.name.clone(),
            city: self.merchant.city.clone(),
        };
        let payload = transfer::build_payload(&request);

        let mut payment = Payment::new(
            sale_id,
            PaymentMethod::Transfer,
            sale.total_cents,
            request.transaction_id.clone(),
        );
        payment.transfer_key = Some(request.key);
        payment.transfer_payload = Some(payload.clone());
        payment.qr_code = Some(transfer::encode_qr(&payload));
        payment.expires_at =
            Some(Utc::now() + chrono::Duration::minutes(self.rules.transfer_expiry_minutes));
        payment.gateway_response = json!({ "status": "pending", "code": "201" });

        if let Some(existing) = self.ledger.insert_payment_if_no_active(&payment).await? {
            return Err(PaymentError::PaymentAlreadyExists(existing.id));
        }
        info!(payment_id = %payment.id, sale_id = %sale_id, "transfer payment issued");
        Ok(payment)
    }

    /// Re-check a pending transfer. Idempotent: non-pending payments are
    /// returned unchanged, and a payment past its expiry fails exactly
    /// once, never to be completed by a late poll. Gateway faults leave
    /// the payment Pending for the next interval.
    pub async fn check_transfer_status(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self.get(payment_id).await?;
        if payment.status != PaymentStatus::Pending || payment.method != PaymentMethod::Transfer {
            return Ok(payment);
        }

        if payment.is_expired_at(Utc::now()) {
            return self.expire_transfer(payment).await;
        }

        let timeout = Duration::from_secs(self.rules.gateway_timeout_seconds);
        let poll =
            tokio::time::timeout(timeout, self.gateway.poll_transfer(&payment.transaction_id)).await;

        match poll {
            Ok(Ok(TransferPoll::Confirmed)) => {
                let mut updated = payment.clone();
                updated.status = PaymentStatus::Completed;
                updated.gateway_response = json!({ "status": "confirmed", "code": "200" });
                if !self.ledger.transition_payment(&updated, PaymentStatus::Pending).await? {
                    // A concurrent check won; take its word for it
                    return self.get(payment_id).await;
                }
                self.sales.mark_paid(payment.sale_id).await?;
                info!(payment_id = %payment_id, "transfer confirmed");
                Ok(updated)
            }
            Ok(Ok(TransferPoll::Pending)) => Ok(payment),
            Ok(Ok(TransferPoll::Expired)) => self.expire_transfer(payment).await,
            Ok(Err(err)) => {
                warn!(payment_id = %payment_id, error = %err, "transfer poll failed, will retry");
                Ok(payment)
            }
            Err(_) => {
                warn!(payment_id = %payment_id, "transfer poll timed out, will retry");
                Ok(payment)
            }
        }
    }

    /// Reverse a completed payment, refunding the sale and its tickets
    pub async fn refund_payment(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self.get(payment_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::NotRefundable { status: format!("{:?}", payment.status) });
        }

        let mut updated = payment.clone();
        updated.status = PaymentStatus::Refunded;
        if !self.ledger.transition_payment(&updated, PaymentStatus::Completed).await? {
            let current = self.get(payment_id).await?;
            return Err(PaymentError::NotRefundable { status: format!("{:?}", current.status) });
        }

        self.sales.refund(payment.sale_id).await?;
        info!(payment_id = %payment_id, sale_id = %payment.sale_id, "payment refunded");
        Ok(updated)
    }

    /// The sale stays Pending and keeps its reservation; releasing it is
    /// an explicit cancellation, not a side effect of expiry.
    async fn expire_transfer(&self, payment: Payment) -> Result<Payment, PaymentError> {
        let mut updated = payment.clone();
        updated.status = PaymentStatus::Failed;
        updated.gateway_response = json!({ "status": "expired", "code": "410" });
        if !self.ledger.transition_payment(&updated, PaymentStatus::Pending).await? {
            return self.get(payment.id).await;
        }
        info!(payment_id = %payment.id, "transfer expired");
        Ok(updated)
    }

    /// A sale can only take a new payment while Pending and without
    /// another live attempt
    async fn payable_sale(&self, sale_id: Uuid) -> Result<Sale, PaymentError> {
        let sale = self
            .ledger
            .load_sale(sale_id)
            .await?
            .ok_or_else(|| PaymentError::SaleNotFound(sale_id.to_string()))?;

        if sale.status != SaleStatus::Pending {
            return Err(PaymentError::SaleNotPayable { status: format!("{:?}", sale.status) });
        }

        if let Some(existing) = self.ledger.active_payment_for_sale(sale_id).await? {
            return Err(PaymentError::PaymentAlreadyExists(existing.id));
        }

        Ok(sale)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Invalid card data: {0}")]
    InvalidCardData(#[from] CardError),

    #[error("Sale already has an active payment: {0}")]
    PaymentAlreadyExists(Uuid),

    #[error("Only completed payments can be refunded, found {status}")]
    NotRefundable { status: String },

    #[error("Sale cannot take a payment from status {status}")]
    SaleNotPayable { status: String },

    #[error(transparent)]
    Sale(#[from] SaleError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

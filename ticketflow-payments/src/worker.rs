use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use ticketflow_core::PaymentStatus;

use crate::controller::{PaymentController, PaymentError};

/// Background loop that re-checks pending transfer payments until they
/// confirm or expire.
///
/// Owns the polling cadence so clients never have to; they can still call
/// `check_transfer_status` directly, the check is idempotent either way.
/// A misbehaving gateway just leaves payments Pending for the next tick.
pub struct ConfirmationPoller {
    payments: Arc<PaymentController>,
    interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(payments: Arc<PaymentController>, interval: Duration) -> Self {
        Self { payments, interval }
    }

    /// Run forever; intended for `tokio::spawn`
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "confirmation poller started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.poll_once().await {
                error!(error = %err, "confirmation sweep failed");
            }
        }
    }

    /// One sweep over the pending transfer queue; returns how many
    /// payments reached a terminal state.
    pub async fn poll_once(&self) -> Result<usize, PaymentError> {
        let mut settled = 0;
        for payment in self.payments.pending_transfers().await? {
            match self.payments.check_transfer_status(payment.id).await {
                Ok(updated) if updated.status != PaymentStatus::Pending => {
                    info!(payment_id = %payment.id, status = ?updated.status, "transfer resolved");
                    settled += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    error!(payment_id = %payment.id, error = %err, "transfer check failed");
                }
            }
        }
        Ok(settled)
    }
}

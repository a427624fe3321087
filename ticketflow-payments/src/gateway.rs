use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use ticketflow_core::{Authorization, CardDetails, GatewayError, PaymentGateway, PaymentMethod, TransferPoll};

/// Random-outcome gateway standing in for a real provider.
///
/// Defaults mirror the posture of a healthy acquirer: most charges
/// approve, transfer confirmations trickle in over a few polls.
/// Deterministic test doubles live with the tests instead.
pub struct SimulatedGateway {
    approve_rate: f64,
    confirm_rate: f64,
}

impl SimulatedGateway {
    pub fn new(approve_rate: f64, confirm_rate: f64) -> Self {
        Self { approve_rate, confirm_rate }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(0.9, 0.7)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(
        &self,
        _amount_cents: i64,
        _method: PaymentMethod,
        _card: &CardDetails,
    ) -> Result<Authorization, GatewayError> {
        let approved = rand::thread_rng().gen_bool(self.approve_rate);
        if approved {
            Ok(Authorization::Approved { reference: Uuid::new_v4().simple().to_string() })
        } else {
            Ok(Authorization::Declined { reason: "declined by issuer".to_string() })
        }
    }

    async fn poll_transfer(&self, _transaction_id: &str) -> Result<TransferPoll, GatewayError> {
        let confirmed = rand::thread_rng().gen_bool(self.confirm_rate);
        if confirmed {
            Ok(TransferPoll::Confirmed)
        } else {
            Ok(TransferPoll::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extreme_rates_are_deterministic() {
        let card = CardDetails {
            number: "4111111111111111".to_string(),
            holder: "Test Holder".to_string(),
            expiry: "12/39".to_string(),
            cvv: "123".to_string(),
        };

        let always = SimulatedGateway::new(1.0, 1.0);
        assert!(matches!(
            always.authorize(1_000, PaymentMethod::CreditCard, &card).await.unwrap(),
            Authorization::Approved { .. }
        ));
        assert_eq!(always.poll_transfer("PIX1").await.unwrap(), TransferPoll::Confirmed);

        let never = SimulatedGateway::new(0.0, 0.0);
        assert!(matches!(
            never.authorize(1_000, PaymentMethod::CreditCard, &card).await.unwrap(),
            Authorization::Declined { .. }
        ));
        assert_eq!(never.poll_transfer("PIX1").await.unwrap(), TransferPoll::Pending);
    }
}

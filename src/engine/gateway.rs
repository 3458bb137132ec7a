//! Payment gateway abstraction and the simulated card processor.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::Money;

/// Card that the simulated processor always declines
pub const DECLINED_CARD: &str = "4000000000000002";
/// Card that makes the simulated processor fail with a processing error
pub const PROCESSING_ERROR_CARD: &str = "4000000000000119";

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: String,
    pub order_number: String,
    pub amount: Money,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
    pub name_on_card: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub reference: String,
    pub amount: Money,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Your card was declined. Please try a different payment method.")]
    Declined,
    #[error("There was an error processing your payment. Please try again.")]
    Processing,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture the amount
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayError>;

    /// Reverse an approved charge whose order could not be completed
    async fn void(&self, receipt: &GatewayReceipt) -> Result<(), GatewayError> {
        debug!(reference = %receipt.reference, "Gateway has no void support, nothing to reverse");
        Ok(())
    }
}

/// Simulated processor: waits for the configured latency, then approves
/// every card except the two sentinel numbers.
#[derive(Debug, Clone)]
pub struct MockGateway {
    latency: Duration,
}

impl MockGateway {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn transaction_reference() -> String {
        let suffix: u32 = rand::rng().random();
        format!("TXN-{}-{:08x}", chrono::Utc::now().timestamp(), suffix)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let card: String = request
            .card_number
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        match card.as_str() {
            DECLINED_CARD => Err(GatewayError::Declined),
            PROCESSING_ERROR_CARD => Err(GatewayError::Processing),
            _ => {
                let reference = Self::transaction_reference();
                info!(
                    order = %request.order_number,
                    amount = %request.amount,
                    reference = %reference,
                    "Simulated charge approved"
                );
                Ok(GatewayReceipt {
                    reference,
                    amount: request.amount,
                })
            }
        }
    }

    async fn void(&self, receipt: &GatewayReceipt) -> Result<(), GatewayError> {
        info!(reference = %receipt.reference, amount = %receipt.amount, "Simulated charge voided");
        Ok(())
    }
}

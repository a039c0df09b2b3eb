use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PaymentMethod;

/// What a provider reports for an external payment reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Pending,
    Paid,
    Cancelled,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiation {
    /// Provider's reference, used for every later poll/refund.
    pub external_ref: String,
    pub status: GatewayStatus,
    /// Checkout link the front-end forwards to the customer, when the provider has one.
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment provider timed out")]
    Timeout,

    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment provider failure: {0}")]
    Provider(String),
}

/// Capability the booking core consumes from a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Start a payment for a reservation; the provider answers with its reference.
    async fn initiate(
        &self,
        amount: Decimal,
        reservation_id: Uuid,
    ) -> Result<PaymentInitiation, GatewayError>;

    /// Current provider-side state. Results may repeat or arrive out of order.
    async fn poll(&self, external_ref: &str) -> Result<GatewayStatus, GatewayError>;

    /// Return `amount` to the payer. `Ok(false)` means the provider refused.
    async fn refund(&self, external_ref: &str, amount: Decimal) -> Result<bool, GatewayError>;
}

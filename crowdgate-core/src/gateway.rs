//! Pluggable payment gateway boundary. The engine treats the gateway as a
//! synchronous charge call with a deadline; whatever retries or webhooks the
//! real provider needs live behind this trait.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Doubles as the gateway-side idempotency reference.
    pub transaction_id: Uuid,
    pub booking_id: i64,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { gateway_reference: String },
    Declined { reason: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a charge. Completed outcomes (approved or declined) are final;
    /// callers never re-submit a completed charge.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Look up the outcome of a previously submitted charge, used by the
    /// payment sweeper to resolve transactions whose charge call timed out.
    /// `None` means the gateway never saw the charge.
    async fn lookup(&self, transaction_id: Uuid) -> Result<Option<ChargeOutcome>, GatewayError>;
}

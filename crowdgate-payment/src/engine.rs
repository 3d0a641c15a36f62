//! Idempotent charge processing. The unique-indexed idempotency key is the
//! whole exactly-once story: duplicate deliveries of `BookingCreated`
//! converge on one Transaction row and the gateway is invoked once.

use crowdgate_core::bus::Topic;
use crowdgate_core::clock::Clock;
use crowdgate_core::gateway::{ChargeOutcome, ChargeRequest, PaymentGateway};
use crowdgate_core::repository::{NewOutboxRecord, RepositoryError, TransactionRepository};
use crowdgate_domain::events::{PaymentFailed, PaymentSuccess};
use crowdgate_domain::transaction::{Transaction, TransactionStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct PaymentEngine {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    gateway_timeout: Duration,
    currency: String,
}

impl PaymentEngine {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            transactions,
            gateway,
            clock,
            gateway_timeout,
            currency: "USD".to_string(),
        }
    }

    /// Process payment for a booking. Safe to call any number of times with
    /// the same `(booking_id, user_id)`: replays return the existing row
    /// without touching the gateway.
    pub async fn process(
        &self,
        booking_id: i64,
        user_id: &str,
        amount: Decimal,
    ) -> Result<Transaction, PaymentError> {
        info!(
            "Processing payment for booking: bookingId={}, amount={}",
            booking_id, amount
        );

        let key = Transaction::idempotency_key_for(booking_id, user_id);
        if let Some(existing) = self.transactions.find_by_idempotency_key(&key).await? {
            warn!("Duplicate payment request detected: bookingId={}", booking_id);
            return Ok(existing);
        }

        let now = self.clock.now();
        let transaction = Transaction {
            transaction_id: Uuid::new_v4(),
            booking_id,
            user_id: user_id.to_string(),
            amount,
            currency: self.currency.clone(),
            status: TransactionStatus::Pending,
            gateway_reference: None,
            failure_reason: None,
            idempotency_key: key.clone(),
            created_at: now,
            updated_at: now,
        };

        if !self.transactions.insert_pending(&transaction).await? {
            // Lost the duplicate-insert race; the winner's row is the truth.
            if let Some(existing) = self.transactions.find_by_idempotency_key(&key).await? {
                return Ok(existing);
            }
            return Err(PaymentError::Repository(RepositoryError::Unavailable(
                format!("transaction for key '{}' vanished after insert race", key),
            )));
        }

        info!(
            "Transaction created: transactionId={}",
            transaction.transaction_id
        );

        let request = ChargeRequest {
            transaction_id: transaction.transaction_id,
            booking_id,
            user_id: user_id.to_string(),
            amount,
            currency: self.currency.clone(),
        };

        let outcome = match timeout(self.gateway_timeout, self.gateway.charge(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                // Transport failure: the charge may or may not have landed.
                // Leave the row PENDING; the sweeper resolves it by lookup.
                warn!(
                    "Gateway transport error, leaving transaction PENDING: transactionId={}, error={}",
                    transaction.transaction_id, e
                );
                return Ok(transaction);
            }
            Err(_) => {
                warn!(
                    "Gateway deadline exceeded, leaving transaction PENDING: transactionId={}",
                    transaction.transaction_id
                );
                return Ok(transaction);
            }
        };

        self.finalize(transaction, outcome).await
    }

    /// Persist a gateway outcome and enqueue the matching saga event in the
    /// same store transaction.
    async fn finalize(
        &self,
        mut transaction: Transaction,
        outcome: ChargeOutcome,
    ) -> Result<Transaction, PaymentError> {
        let now = self.clock.now();
        match outcome {
            ChargeOutcome::Approved { gateway_reference } => {
                info!(
                    "Payment successful: transactionId={}, gatewayRef={}",
                    transaction.transaction_id, gateway_reference
                );
                let event = PaymentSuccess {
                    booking_id: transaction.booking_id,
                    transaction_id: transaction.transaction_id,
                    user_id: transaction.user_id.clone(),
                    amount: transaction.amount,
                    gateway_reference: gateway_reference.clone(),
                    timestamp: now,
                };
                self.transactions
                    .mark_success(
                        transaction.transaction_id,
                        &gateway_reference,
                        now,
                        outbox_record(Topic::PaymentSuccess, transaction.booking_id, &event)?,
                    )
                    .await?;
                transaction.status = TransactionStatus::Success;
                transaction.gateway_reference = Some(gateway_reference);
            }
            ChargeOutcome::Declined { reason } => {
                warn!(
                    "Payment failed: transactionId={}, reason={}",
                    transaction.transaction_id, reason
                );
                let event = PaymentFailed {
                    booking_id: transaction.booking_id,
                    user_id: transaction.user_id.clone(),
                    reason: reason.clone(),
                    timestamp: now,
                };
                self.transactions
                    .mark_failed(
                        transaction.transaction_id,
                        &reason,
                        now,
                        outbox_record(Topic::PaymentFailed, transaction.booking_id, &event)?,
                    )
                    .await?;
                transaction.status = TransactionStatus::Failed;
                transaction.failure_reason = Some(reason);
            }
        }
        transaction.updated_at = now;
        Ok(transaction)
    }

    /// Resolve transactions stuck in PENDING past the gateway deadline.
    /// A charge the gateway completed is finalized with that outcome; a
    /// charge the gateway never saw is failed so the saga can free the
    /// seats. Returns how many were resolved.
    pub async fn resolve_stalled(&self) -> Result<usize, PaymentError> {
        let cutoff = self.clock.now()
            - chrono::Duration::seconds(self.gateway_timeout.as_secs() as i64);
        let stalled = self.transactions.find_stalled(cutoff).await?;

        let mut resolved = 0;
        for transaction in stalled {
            let id = transaction.transaction_id;
            match self.gateway.lookup(id).await {
                Ok(Some(outcome)) => {
                    info!("Resolved stalled transaction via gateway lookup: transactionId={}", id);
                    self.finalize(transaction, outcome).await?;
                    resolved += 1;
                }
                Ok(None) => {
                    info!("Gateway never saw stalled charge, failing: transactionId={}", id);
                    self.finalize(
                        transaction,
                        ChargeOutcome::Declined {
                            reason: "Gateway timeout".to_string(),
                        },
                    )
                    .await?;
                    resolved += 1;
                }
                Err(e) => {
                    // Gateway still unreachable; the next sweep retries.
                    warn!("Gateway lookup failed for transactionId={}: {}", id, e);
                }
            }
        }
        Ok(resolved)
    }

    pub async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>, PaymentError> {
        Ok(self.transactions.find(transaction_id).await?)
    }

    pub async fn list_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Vec<Transaction>, PaymentError> {
        Ok(self.transactions.list_for_booking(booking_id).await?)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, PaymentError> {
        Ok(self.transactions.list_for_user(user_id).await?)
    }
}

fn outbox_record<T: serde::Serialize>(
    topic: Topic,
    booking_id: i64,
    event: &T,
) -> Result<NewOutboxRecord, serde_json::Error> {
    Ok(NewOutboxRecord {
        topic: topic.as_str().to_string(),
        partition_key: booking_id.to_string(),
        payload: serde_json::to_value(event)?,
    })
}

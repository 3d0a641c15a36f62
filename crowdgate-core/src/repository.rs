//! Persistence traits for the two durable aggregates plus the outbox.
//!
//! Booking and Transaction are independent aggregates joined by id; nothing
//! holds an in-memory reference across them. Implementations live in
//! `crowdgate-store` (Postgres for production, in-memory for tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowdgate_domain::booking::{Booking, BookingStatus, NewBooking};
use crowdgate_domain::transaction::Transaction;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("row decode failed: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a PENDING booking and return it with the assigned monotonic id.
    async fn create(&self, new_booking: NewBooking) -> Result<Booking, RepositoryError>;

    async fn find(&self, booking_id: i64) -> Result<Option<Booking>, RepositoryError>;

    /// Ownership-scoped lookup; `None` when the id exists under another user.
    async fn find_for_user(
        &self,
        booking_id: i64,
        user_id: &str,
    ) -> Result<Option<Booking>, RepositoryError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, RepositoryError>;

    /// Compare-and-set on status: the update applies only when the row is
    /// still in `from`. Returns whether the transition happened, which is
    /// what makes concurrent sweep/payment handlers safe.
    async fn transition(
        &self,
        booking_id: i64,
        from: BookingStatus,
        to: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError>;

    /// PENDING bookings whose `expires_at` has passed.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError>;
}

/// Event queued for publication in the same store transaction as the state
/// change it announces.
#[derive(Debug, Clone)]
pub struct NewOutboxRecord {
    pub topic: String,
    pub partition_key: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub id: i64,
    pub topic: String,
    pub partition_key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a PENDING transaction. Returns false when the idempotency key
    /// already has a row (the caller lost the duplicate race and should
    /// re-read the winner).
    async fn insert_pending(&self, transaction: &Transaction) -> Result<bool, RepositoryError>;

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, RepositoryError>;

    async fn find(&self, transaction_id: Uuid) -> Result<Option<Transaction>, RepositoryError>;

    async fn list_for_booking(&self, booking_id: i64)
        -> Result<Vec<Transaction>, RepositoryError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, RepositoryError>;

    /// Mark SUCCESS and enqueue the outbox record in one store transaction.
    async fn mark_success(
        &self,
        transaction_id: Uuid,
        gateway_reference: &str,
        updated_at: DateTime<Utc>,
        outbox: NewOutboxRecord,
    ) -> Result<(), RepositoryError>;

    /// Mark FAILED and enqueue the outbox record in one store transaction.
    async fn mark_failed(
        &self,
        transaction_id: Uuid,
        failure_reason: &str,
        updated_at: DateTime<Utc>,
        outbox: NewOutboxRecord,
    ) -> Result<(), RepositoryError>;

    /// PENDING transactions untouched since `cutoff`, for the payment
    /// sweeper to resolve against the gateway.
    async fn find_stalled(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, RepositoryError>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Oldest-first batch of records not yet confirmed published.
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxRecord>, RepositoryError>;

    async fn mark_published(&self, id: i64) -> Result<(), RepositoryError>;
}

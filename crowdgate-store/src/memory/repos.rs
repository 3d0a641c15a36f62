use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowdgate_core::repository::{
    BookingRepository, NewOutboxRecord, OutboxRecord, OutboxRepository, RepositoryError,
    TransactionRepository,
};
use crowdgate_domain::booking::{Booking, BookingStatus, NewBooking};
use crowdgate_domain::transaction::{Transaction, TransactionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// HashMap-backed booking store with the same CAS semantics as the Postgres
/// implementation.
#[derive(Debug, Default)]
pub struct MemoryBookingRepository {
    bookings: Mutex<HashMap<i64, Booking>>,
    next_id: AtomicI64,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn create(&self, new_booking: NewBooking) -> Result<Booking, RepositoryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let booking = Booking {
            id,
            user_id: new_booking.user_id,
            event_id: new_booking.event_id,
            seat_ids: new_booking.seat_ids,
            amount: new_booking.amount,
            status: BookingStatus::Pending,
            created_at: new_booking.created_at,
            confirmed_at: None,
            expires_at: new_booking.expires_at,
        };
        self.bookings.lock().unwrap().insert(id, booking.clone());
        Ok(booking)
    }

    async fn find(&self, booking_id: i64) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.bookings.lock().unwrap().get(&booking_id).cloned())
    }

    async fn find_for_user(
        &self,
        booking_id: i64,
        user_id: &str,
    ) -> Result<Option<Booking>, RepositoryError> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .get(&booking_id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.lock().unwrap();
        let mut result: Vec<Booking> = bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by_key(|b| std::cmp::Reverse(b.id));
        Ok(result)
    }

    async fn transition(
        &self,
        booking_id: i64,
        from: BookingStatus,
        to: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let mut bookings = self.bookings.lock().unwrap();
        match bookings.get_mut(&booking_id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                if confirmed_at.is_some() {
                    booking.confirmed_at = confirmed_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.lock().unwrap();
        let mut expired: Vec<Booking> = bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.id);
        Ok(expired)
    }
}

/// Vec-backed transaction store; also carries the outbox so the
/// status-change-plus-enqueue step stays atomic under one mutex.
#[derive(Debug, Default)]
pub struct MemoryTransactionRepository {
    inner: Mutex<TxInner>,
    next_outbox_id: AtomicI64,
}

#[derive(Debug, Default)]
struct TxInner {
    rows: Vec<Transaction>,
    outbox: Vec<OutboxRecord>,
}

impl MemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self, inner: &mut TxInner, outbox: NewOutboxRecord, created_at: DateTime<Utc>) {
        let id = self.next_outbox_id.fetch_add(1, Ordering::SeqCst) + 1;
        inner.outbox.push(OutboxRecord {
            id,
            topic: outbox.topic,
            partition_key: outbox.partition_key,
            payload: outbox.payload,
            created_at,
            published_at: None,
        });
    }
}

#[async_trait]
impl TransactionRepository for MemoryTransactionRepository {
    async fn insert_pending(&self, transaction: &Transaction) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .rows
            .iter()
            .any(|t| t.idempotency_key == transaction.idempotency_key)
        {
            return Ok(false);
        }
        inner.rows.push(transaction.clone());
        Ok(true)
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|t| t.idempotency_key == key)
            .cloned())
    }

    async fn find(&self, transaction_id: Uuid) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_success(
        &self,
        transaction_id: Uuid,
        gateway_reference: &str,
        updated_at: DateTime<Utc>,
        outbox: NewOutboxRecord,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .rows
            .iter_mut()
            .find(|t| t.transaction_id == transaction_id)
        {
            row.status = TransactionStatus::Success;
            row.gateway_reference = Some(gateway_reference.to_string());
            row.updated_at = updated_at;
        }
        self.enqueue(&mut inner, outbox, updated_at);
        Ok(())
    }

    async fn mark_failed(
        &self,
        transaction_id: Uuid,
        failure_reason: &str,
        updated_at: DateTime<Utc>,
        outbox: NewOutboxRecord,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .rows
            .iter_mut()
            .find(|t| t.transaction_id == transaction_id)
        {
            row.status = TransactionStatus::Failed;
            row.failure_reason = Some(failure_reason.to_string());
            row.updated_at = updated_at;
        }
        self.enqueue(&mut inner, outbox, updated_at);
        Ok(())
    }

    async fn find_stalled(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|t| t.status == TransactionStatus::Pending && t.updated_at < cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxRepository for MemoryTransactionRepository {
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxRecord>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|r| r.published_at.is_none())
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: i64) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.outbox.iter_mut().find(|r| r.id == id) {
            record.published_at = Some(Utc::now());
        }
        Ok(())
    }
}

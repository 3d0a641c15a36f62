//! Booking state machine. One non-terminal state (PENDING) and four
//! terminal ones; every transition is a per-row compare-and-set, so the
//! expiry sweep, the payment handlers, and user cancellation can all race
//! and exactly one of them wins.
//!
//! Every path into a terminal state releases the seat locks. A failed
//! release is logged and left to the lock TTL.

use chrono::Duration;
use crowdgate_core::bus::{publish_json, EventBus, Topic};
use crowdgate_core::catalog::EventCatalog;
use crowdgate_core::clock::Clock;
use crowdgate_core::repository::{BookingRepository, RepositoryError};
use crowdgate_domain::booking::{Booking, BookingStatus, NewBooking};
use crowdgate_domain::events::{BookingConfirmed, BookingCreated};
use crowdgate_reservation::{ReservationError, SeatLockService};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("seats are not locked by this user")]
    SeatsNotOwned,
    #[error("booking not found: {0}")]
    BookingNotFound(i64),
    #[error("booking {0} does not belong to this user")]
    NotBookingOwner(i64),
    #[error("cannot cancel confirmed booking: {0}")]
    CannotCancelConfirmed(i64),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

pub struct BookingSaga {
    bookings: Arc<dyn BookingRepository>,
    seat_locks: Arc<SeatLockService>,
    catalog: Arc<dyn EventCatalog>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    booking_expiry: Duration,
}

impl BookingSaga {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        seat_locks: Arc<SeatLockService>,
        catalog: Arc<dyn EventCatalog>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        booking_expiry: std::time::Duration,
    ) -> Self {
        Self {
            bookings,
            seat_locks,
            catalog,
            bus,
            clock,
            booking_expiry: Duration::seconds(booking_expiry.as_secs() as i64),
        }
    }

    /// Create a PENDING booking for seats the user already holds, then
    /// announce it so the payment engine picks it up.
    pub async fn create_booking(
        &self,
        user_id: &str,
        event_id: i64,
        seat_ids: Vec<String>,
        amount: Decimal,
    ) -> Result<Booking, SagaError> {
        info!(
            "Creating booking: userId={}, eventId={}, seats={:?}",
            user_id, event_id, seat_ids
        );

        let owned = self
            .seat_locks
            .verify_ownership(event_id, &seat_ids, user_id)
            .await?;
        if !owned {
            return Err(SagaError::SeatsNotOwned);
        }

        let now = self.clock.now();
        let booking = self
            .bookings
            .create(NewBooking {
                user_id: user_id.to_string(),
                event_id,
                seat_ids,
                amount,
                created_at: now,
                expires_at: now + self.booking_expiry,
            })
            .await?;

        info!("Booking created with ID: {}", booking.id);

        let event = BookingCreated {
            booking_id: booking.id,
            user_id: booking.user_id.clone(),
            event_id: booking.event_id,
            seat_ids: booking.seat_ids.clone(),
            amount: booking.amount,
            timestamp: booking.created_at,
        };
        // The PENDING row is already durable; if the announce never lands
        // the expiry sweep reclaims the seats.
        if let Err(e) = publish_json(
            self.bus.as_ref(),
            Topic::BookingCreated,
            &booking.id.to_string(),
            &event,
        )
        .await
        {
            error!(
                "Failed to publish BookingCreated: bookingId={}, error={}",
                booking.id, e
            );
        }

        Ok(booking)
    }

    /// PENDING -> CONFIRMED. Replays and lost races are logged and ignored.
    pub async fn on_payment_success(&self, booking_id: i64) -> Result<(), SagaError> {
        info!("Confirming booking: bookingId={}", booking_id);

        let booking = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or(SagaError::BookingNotFound(booking_id))?;

        if booking.status != BookingStatus::Pending {
            warn!(
                "Booking is not in PENDING state: bookingId={}, status={}",
                booking_id, booking.status
            );
            return Ok(());
        }

        let now = self.clock.now();
        if !self
            .bookings
            .transition(
                booking_id,
                BookingStatus::Pending,
                BookingStatus::Confirmed,
                Some(now),
            )
            .await?
        {
            warn!(
                "Lost confirm race, booking already transitioned: bookingId={}",
                booking_id
            );
            return Ok(());
        }

        self.release_locks(&booking).await;

        let summary = match self.catalog.event_summary(booking.event_id).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                warn!("Event not in catalog: eventId={}", booking.event_id);
                Default::default()
            }
            Err(e) => {
                warn!("Catalog lookup failed: eventId={}, error={}", booking.event_id, e);
                Default::default()
            }
        };

        let event = BookingConfirmed {
            booking_id: booking.id,
            user_id: booking.user_id.clone(),
            event_id: booking.event_id,
            event_name: summary.name,
            event_date: summary.date,
            seat_ids: booking.seat_ids.clone(),
            timestamp: now,
        };
        if let Err(e) = publish_json(
            self.bus.as_ref(),
            Topic::BookingConfirmed,
            &booking.id.to_string(),
            &event,
        )
        .await
        {
            error!(
                "Failed to publish BookingConfirmed: bookingId={}, error={}",
                booking.id, e
            );
        }

        info!("Booking confirmed: bookingId={}", booking_id);
        Ok(())
    }

    /// PENDING -> FAILED; seats go back on the market.
    pub async fn on_payment_failed(&self, booking_id: i64, reason: &str) -> Result<(), SagaError> {
        info!("Failing booking: bookingId={}, reason={}", booking_id, reason);

        let booking = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or(SagaError::BookingNotFound(booking_id))?;

        if booking.status != BookingStatus::Pending {
            warn!(
                "Booking is not in PENDING state: bookingId={}, status={}",
                booking_id, booking.status
            );
            return Ok(());
        }

        if !self
            .bookings
            .transition(
                booking_id,
                BookingStatus::Pending,
                BookingStatus::Failed,
                None,
            )
            .await?
        {
            warn!(
                "Lost fail race, booking already transitioned: bookingId={}",
                booking_id
            );
            return Ok(());
        }

        self.release_locks(&booking).await;

        info!("Booking failed: bookingId={}", booking_id);
        Ok(())
    }

    /// User-initiated cancellation. Confirmed bookings are refused; a
    /// booking that already reached some other terminal state is left
    /// as-is so the call stays idempotent.
    pub async fn cancel(&self, booking_id: i64, user_id: &str) -> Result<(), SagaError> {
        info!("Cancelling booking: bookingId={}, userId={}", booking_id, user_id);

        let booking = self
            .bookings
            .find_for_user(booking_id, user_id)
            .await?
            .ok_or(SagaError::BookingNotFound(booking_id))?;

        match booking.status {
            BookingStatus::Confirmed => Err(SagaError::CannotCancelConfirmed(booking_id)),
            BookingStatus::Pending => {
                if self
                    .bookings
                    .transition(
                        booking_id,
                        BookingStatus::Pending,
                        BookingStatus::Cancelled,
                        None,
                    )
                    .await?
                {
                    self.release_locks(&booking).await;
                    info!("Booking cancelled: bookingId={}", booking_id);
                }
                Ok(())
            }
            _ => {
                warn!(
                    "Cancel ignored, booking already terminal: bookingId={}, status={}",
                    booking_id, booking.status
                );
                Ok(())
            }
        }
    }

    /// Expire PENDING bookings past their payment window. The status CAS
    /// makes this safe to run while payment results are still arriving.
    /// Returns the number of bookings expired.
    pub async fn expire_sweep(&self) -> Result<usize, SagaError> {
        let now = self.clock.now();
        let expired = self.bookings.find_expired(now).await?;

        if expired.is_empty() {
            return Ok(0);
        }
        info!("Found {} expired bookings", expired.len());

        let mut count = 0;
        for booking in expired {
            if self
                .bookings
                .transition(
                    booking.id,
                    BookingStatus::Pending,
                    BookingStatus::Expired,
                    None,
                )
                .await?
            {
                self.release_locks(&booking).await;
                info!("Booking expired: bookingId={}", booking.id);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Ownership-checked lookup: absent id and foreign owner are distinct
    /// failures so the HTTP layer can answer 404 vs 403.
    pub async fn get(&self, booking_id: i64, user_id: &str) -> Result<Booking, SagaError> {
        let booking = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or(SagaError::BookingNotFound(booking_id))?;
        if booking.user_id != user_id {
            return Err(SagaError::NotBookingOwner(booking_id));
        }
        Ok(booking)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, SagaError> {
        Ok(self.bookings.list_for_user(user_id).await?)
    }

    /// Locks are released on every terminal transition; when the store is
    /// unreachable the TTL is the backstop, so confirmation never fails on
    /// a release error.
    async fn release_locks(&self, booking: &Booking) {
        if let Err(e) = self
            .seat_locks
            .release_many(booking.event_id, &booking.seat_ids, &booking.user_id)
            .await
        {
            error!(
                "Failed to release locks for booking: bookingId={}, error={}",
                booking.id, e
            );
        } else {
            info!("Released locks for booking: bookingId={}", booking.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdgate_core::catalog::StaticEventCatalog;
    use crowdgate_core::clock::ManualClock;
    use crowdgate_store::memory::{MemoryBookingRepository, MemoryEventBus, MemoryLockStore};
    use std::time::Duration as StdDuration;

    struct Fixture {
        saga: BookingSaga,
        locks: Arc<SeatLockService>,
        bus: Arc<MemoryEventBus>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLockStore::new());
        let locks = Arc::new(SeatLockService::new(
            store,
            StdDuration::from_secs(600),
        ));
        let catalog = Arc::new(StaticEventCatalog::new());
        catalog.register(1, "Arena Night", "2026-09-01");
        let bus = Arc::new(MemoryEventBus::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));

        let saga = BookingSaga::new(
            Arc::new(MemoryBookingRepository::new()),
            Arc::clone(&locks),
            catalog,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            StdDuration::from_secs(600),
        );
        Fixture {
            saga,
            locks,
            bus,
            clock,
        }
    }

    async fn locked_booking(f: &Fixture, user: &str, seats: &[&str]) -> Booking {
        let seats: Vec<String> = seats.iter().map(|s| s.to_string()).collect();
        assert!(f.locks.try_lock_many(1, &seats, user).await.unwrap());
        f.saga
            .create_booking(user, 1, seats, Decimal::new(20000, 2))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_booking_requires_owned_seats() {
        let f = fixture();
        let err = f
            .saga
            .create_booking("u-1", 1, vec!["A1".to_string()], Decimal::new(100, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::SeatsNotOwned));
    }

    #[tokio::test]
    async fn create_booking_publishes_booking_created() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1", "A2"]).await;

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.expires_at - booking.created_at, Duration::seconds(600));

        let published = f.bus.published("booking.created");
        assert_eq!(published.len(), 1);
        let event: BookingCreated = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(event.booking_id, booking.id);
        assert_eq!(event.seat_ids, vec!["A1".to_string(), "A2".to_string()]);
    }

    #[tokio::test]
    async fn payment_success_confirms_and_releases_locks() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1", "A2"]).await;

        f.saga.on_payment_success(booking.id).await.unwrap();

        let confirmed = f.saga.get(booking.id, "u-1").await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        assert!(!f.locks.is_locked(1, "A1").await.unwrap());
        assert!(!f.locks.is_locked(1, "A2").await.unwrap());

        let published = f.bus.published("booking.confirmed");
        assert_eq!(published.len(), 1);
        let event: BookingConfirmed = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(event.event_name, "Arena Night");
    }

    #[tokio::test]
    async fn payment_success_replay_is_ignored() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;

        f.saga.on_payment_success(booking.id).await.unwrap();
        f.saga.on_payment_success(booking.id).await.unwrap();

        // One confirmation event despite the duplicate delivery
        assert_eq!(f.bus.published("booking.confirmed").len(), 1);
    }

    #[tokio::test]
    async fn payment_failure_frees_the_seat_for_others() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;

        f.saga
            .on_payment_failed(booking.id, "Card declined")
            .await
            .unwrap();

        let failed = f.saga.get(booking.id, "u-1").await.unwrap();
        assert_eq!(failed.status, BookingStatus::Failed);

        // Another user can take the seat now
        assert!(f.locks.try_lock(1, "A1", "u-2").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_booking_is_an_error_for_retry() {
        let f = fixture();
        let err = f.saga.on_payment_success(999).await.unwrap_err();
        assert!(matches!(err, SagaError::BookingNotFound(999)));
    }

    #[tokio::test]
    async fn cancel_rejects_confirmed_and_ignores_terminal() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;
        f.saga.on_payment_success(booking.id).await.unwrap();

        let err = f.saga.cancel(booking.id, "u-1").await.unwrap_err();
        assert!(matches!(err, SagaError::CannotCancelConfirmed(_)));

        let other = locked_booking(&f, "u-2", &["B1"]).await;
        f.saga.on_payment_failed(other.id, "Card expired").await.unwrap();
        // Already FAILED; cancelling again is a no-op, not a regression
        f.saga.cancel(other.id, "u-2").await.unwrap();
        let row = f.saga.get(other.id, "u-2").await.unwrap();
        assert_eq!(row.status, BookingStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_pending_releases_locks() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;

        f.saga.cancel(booking.id, "u-1").await.unwrap();

        let row = f.saga.get(booking.id, "u-1").await.unwrap();
        assert_eq!(row.status, BookingStatus::Cancelled);
        assert!(!f.locks.is_locked(1, "A1").await.unwrap());
    }

    #[tokio::test]
    async fn cancel_checks_ownership() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;

        let err = f.saga.cancel(booking.id, "intruder").await.unwrap_err();
        assert!(matches!(err, SagaError::BookingNotFound(_)));
    }

    #[tokio::test]
    async fn sweep_expires_overdue_bookings() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;

        // Not yet due
        assert_eq!(f.saga.expire_sweep().await.unwrap(), 0);

        f.clock.advance(Duration::seconds(601));
        assert_eq!(f.saga.expire_sweep().await.unwrap(), 1);

        let row = f.saga.get(booking.id, "u-1").await.unwrap();
        assert_eq!(row.status, BookingStatus::Expired);
        assert!(!f.locks.is_locked(1, "A1").await.unwrap());

        // Re-running the sweep finds nothing
        assert_eq!(f.saga.expire_sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_never_regresses_a_confirmed_booking() {
        let f = fixture();
        let booking = locked_booking(&f, "u-1", &["A1"]).await;
        f.saga.on_payment_success(booking.id).await.unwrap();

        f.clock.advance(Duration::seconds(601));
        assert_eq!(f.saga.expire_sweep().await.unwrap(), 0);

        let row = f.saga.get(booking.id, "u-1").await.unwrap();
        assert_eq!(row.status, BookingStatus::Confirmed);
    }
}

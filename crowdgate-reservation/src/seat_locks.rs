//! Distributed per-seat locking for VISUAL bookings.
//!
//! One key per `(event, seat)` pair, the owning user id as the value.
//! Acquisition is a single SET-NX step, release is owner-guarded
//! compare-and-delete, and the TTL bounds how long an abandoned selection
//! can shadow a seat.

use crowdgate_core::lock_store::{LockStore, TTL_MISSING};
use crowdgate_domain::keys;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::ReservationError;

/// Point-in-time snapshot of a single seat lock.
#[derive(Debug, Clone)]
pub struct SeatLockView {
    pub locked: bool,
    pub owner: Option<String>,
    pub ttl_seconds: i64,
}

pub struct SeatLockService {
    store: Arc<dyn LockStore>,
    ttl: Duration,
}

impl SeatLockService {
    pub fn new(store: Arc<dyn LockStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to lock a seat for a user. Re-entrant for the current owner:
    /// a repeat attempt refreshes the TTL and reports success, so retried
    /// requests under at-least-once delivery stay invisible to the caller.
    pub async fn try_lock(
        &self,
        event_id: i64,
        seat_id: &str,
        user_id: &str,
    ) -> Result<bool, ReservationError> {
        let key = keys::seat_lock(event_id, seat_id);

        if self.store.set_if_absent(&key, user_id, self.ttl).await? {
            info!(
                "Seat locked: event={}, seat={}, user={}",
                event_id, seat_id, user_id
            );
            return Ok(true);
        }

        match self.store.get(&key).await? {
            Some(owner) if owner == user_id => {
                // Same user re-locking; not recursion counting, one release
                // still clears the lock.
                self.store.expire(&key, self.ttl).await?;
                info!(
                    "Seat already locked by same user: event={}, seat={}, user={}",
                    event_id, seat_id, user_id
                );
                Ok(true)
            }
            owner => {
                warn!(
                    "Seat already locked by another user: event={}, seat={}, owner={:?}",
                    event_id, seat_id, owner
                );
                Ok(false)
            }
        }
    }

    /// All-or-nothing multi-seat lock. On any failure every seat in the
    /// request is released (the owner guard skips seats we never got), so
    /// two users contending for overlapping sets may both abort; retrying
    /// is the client's call.
    pub async fn try_lock_many(
        &self,
        event_id: i64,
        seat_ids: &[String],
        user_id: &str,
    ) -> Result<bool, ReservationError> {
        info!(
            "Attempting to lock {} seats for user {}",
            seat_ids.len(),
            user_id
        );

        for seat_id in seat_ids {
            if !self.try_lock(event_id, seat_id, user_id).await? {
                warn!("Failed to lock seat {}, rolling back", seat_id);
                self.release_many(event_id, seat_ids, user_id).await?;
                return Ok(false);
            }
        }

        info!(
            "Successfully locked all {} seats for user {}",
            seat_ids.len(),
            user_id
        );
        Ok(true)
    }

    /// Owner-guarded release. Returns false when the seat is not locked or
    /// locked by someone else.
    pub async fn release(
        &self,
        event_id: i64,
        seat_id: &str,
        user_id: &str,
    ) -> Result<bool, ReservationError> {
        let key = keys::seat_lock(event_id, seat_id);
        let released = self.store.delete_if_equals(&key, user_id).await?;

        if released {
            info!(
                "Seat released: event={}, seat={}, user={}",
                event_id, seat_id, user_id
            );
        } else {
            warn!(
                "Release skipped, not the owner or not locked: event={}, seat={}, user={}",
                event_id, seat_id, user_id
            );
        }
        Ok(released)
    }

    /// Release a set of seats; seats not owned by `user_id` are silently
    /// skipped.
    pub async fn release_many(
        &self,
        event_id: i64,
        seat_ids: &[String],
        user_id: &str,
    ) -> Result<(), ReservationError> {
        for seat_id in seat_ids {
            self.release(event_id, seat_id, user_id).await?;
        }
        Ok(())
    }

    pub async fn is_locked(&self, event_id: i64, seat_id: &str) -> Result<bool, ReservationError> {
        let key = keys::seat_lock(event_id, seat_id);
        Ok(self.store.get(&key).await?.is_some())
    }

    pub async fn owner(
        &self,
        event_id: i64,
        seat_id: &str,
    ) -> Result<Option<String>, ReservationError> {
        let key = keys::seat_lock(event_id, seat_id);
        Ok(self.store.get(&key).await?)
    }

    /// Remaining TTL in seconds, [`TTL_MISSING`] when unlocked.
    pub async fn ttl(&self, event_id: i64, seat_id: &str) -> Result<i64, ReservationError> {
        let key = keys::seat_lock(event_id, seat_id);
        Ok(self.store.ttl(&key).await?)
    }

    /// One call for the check endpoint: lock state, owner, TTL.
    pub async fn inspect(
        &self,
        event_id: i64,
        seat_id: &str,
    ) -> Result<SeatLockView, ReservationError> {
        let owner = self.owner(event_id, seat_id).await?;
        let ttl_seconds = if owner.is_some() {
            self.ttl(event_id, seat_id).await?
        } else {
            TTL_MISSING
        };
        Ok(SeatLockView {
            locked: owner.is_some(),
            owner,
            ttl_seconds,
        })
    }

    /// Currently locked seats of an event via prefix scan; may be stale by
    /// the time the caller reads it.
    pub async fn locked_seats(&self, event_id: i64) -> Result<Vec<String>, ReservationError> {
        let prefix = keys::seat_lock_prefix(event_id);
        let keys = self.store.scan(&prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|key| keys::seat_from_lock_key(event_id, key))
            .map(str::to_string)
            .collect())
    }

    /// True only when every listed seat is currently owned by `user_id`.
    pub async fn verify_ownership(
        &self,
        event_id: i64,
        seat_ids: &[String],
        user_id: &str,
    ) -> Result<bool, ReservationError> {
        for seat_id in seat_ids {
            match self.owner(event_id, seat_id).await? {
                Some(owner) if owner == user_id => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Admin escape hatch: drop every lock of an event. Returns how many
    /// were removed.
    pub async fn force_release_all(&self, event_id: i64) -> Result<u64, ReservationError> {
        let prefix = keys::seat_lock_prefix(event_id);
        let keys = self.store.scan(&prefix).await?;
        let mut released = 0u64;
        for key in &keys {
            if self.store.delete(key).await? {
                released += 1;
            }
        }
        warn!("Force released {} locks for event {}", released, event_id);
        Ok(released)
    }
}

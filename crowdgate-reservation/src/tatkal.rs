//! First-come-first-served inventory for Tatkal events. No seat selection,
//! no per-seat locks; one atomic counter per event keeps the hot path to a
//! single store round-trip.

use crowdgate_core::lock_store::LockStore;
use crowdgate_domain::keys;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ReservationError;

pub struct TatkalInventory {
    store: Arc<dyn LockStore>,
}

impl TatkalInventory {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Seed (or overwrite) the counter for an event.
    pub async fn initialize(&self, event_id: i64, total_seats: i64) -> Result<(), ReservationError> {
        let key = keys::tatkal_inventory(event_id);
        self.store.set(&key, &total_seats.to_string()).await?;
        info!(
            "Initialized Tatkal inventory: event={}, seats={}",
            event_id, total_seats
        );
        Ok(())
    }

    /// Optimistic reserve: decrement first, compensate on overshoot. The
    /// decision uses the raw post-decrement value; a CAS loop would
    /// serialise contenders on the hot path. Readers may glimpse a negative
    /// value inside the compensation window, which `remaining` clamps away.
    pub async fn try_reserve(&self, event_id: i64) -> Result<bool, ReservationError> {
        let key = keys::tatkal_inventory(event_id);
        let remaining = self.store.decr(&key).await?;

        if remaining < 0 {
            self.store.incr(&key).await?;
            warn!("Tatkal event sold out: event={}", event_id);
            return Ok(false);
        }

        info!(
            "Tatkal seat reserved: event={}, remaining={}",
            event_id, remaining
        );
        Ok(true)
    }

    /// Give a reserved seat back, used when a downstream step fails.
    pub async fn release(&self, event_id: i64) -> Result<i64, ReservationError> {
        let key = keys::tatkal_inventory(event_id);
        let remaining = self.store.incr(&key).await?;
        info!(
            "Tatkal seat released: event={}, remaining={}",
            event_id, remaining
        );
        Ok(remaining)
    }

    /// Remaining seats, clamped to zero; -1 when never initialised.
    pub async fn remaining(&self, event_id: i64) -> Result<i64, ReservationError> {
        let key = keys::tatkal_inventory(event_id);
        match self.store.get(&key).await? {
            None => {
                warn!("Tatkal inventory not initialized: event={}", event_id);
                Ok(-1)
            }
            Some(value) => match value.parse::<i64>() {
                Ok(count) => Ok(count.max(0)),
                Err(_) => {
                    warn!(
                        "Invalid inventory value: event={}, value={}",
                        event_id, value
                    );
                    Ok(-1)
                }
            },
        }
    }

    pub async fn is_sold_out(&self, event_id: i64) -> Result<bool, ReservationError> {
        Ok(self.remaining(event_id).await? <= 0)
    }

    /// Admin reset to a fresh capacity.
    pub async fn reset(&self, event_id: i64, total_seats: i64) -> Result<(), ReservationError> {
        let key = keys::tatkal_inventory(event_id);
        self.store.set(&key, &total_seats.to_string()).await?;
        warn!(
            "Tatkal inventory reset: event={}, seats={}",
            event_id, total_seats
        );
        Ok(())
    }

    /// Remove the counter entirely (event deleted).
    pub async fn delete(&self, event_id: i64) -> Result<(), ReservationError> {
        let key = keys::tatkal_inventory(event_id);
        self.store.delete(&key).await?;
        info!("Tatkal inventory deleted: event={}", event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdgate_store::memory::MemoryLockStore;

    fn inventory() -> TatkalInventory {
        TatkalInventory::new(Arc::new(MemoryLockStore::new()))
    }

    #[tokio::test]
    async fn reserve_until_sold_out() {
        let tatkal = inventory();
        tatkal.initialize(200, 3).await.unwrap();

        assert!(tatkal.try_reserve(200).await.unwrap());
        assert!(tatkal.try_reserve(200).await.unwrap());
        assert!(tatkal.try_reserve(200).await.unwrap());
        assert!(!tatkal.try_reserve(200).await.unwrap());

        assert_eq!(tatkal.remaining(200).await.unwrap(), 0);
        assert!(tatkal.is_sold_out(200).await.unwrap());
    }

    #[tokio::test]
    async fn release_restores_capacity() {
        let tatkal = inventory();
        tatkal.initialize(200, 1).await.unwrap();

        assert!(tatkal.try_reserve(200).await.unwrap());
        assert!(!tatkal.try_reserve(200).await.unwrap());

        tatkal.release(200).await.unwrap();
        assert_eq!(tatkal.remaining(200).await.unwrap(), 1);
        assert!(tatkal.try_reserve(200).await.unwrap());
    }

    #[tokio::test]
    async fn remaining_is_negative_one_when_uninitialised() {
        let tatkal = inventory();
        assert_eq!(tatkal.remaining(404).await.unwrap(), -1);
        assert!(tatkal.is_sold_out(404).await.unwrap());
    }

    #[tokio::test]
    async fn no_oversell_under_concurrency() {
        let store = Arc::new(MemoryLockStore::new());
        let tatkal = Arc::new(TatkalInventory::new(store));
        tatkal.initialize(200, 50).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..500 {
            let tatkal = Arc::clone(&tatkal);
            handles.push(tokio::spawn(
                async move { tatkal.try_reserve(200).await.unwrap() },
            ));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 50);
        assert_eq!(tatkal.remaining(200).await.unwrap(), 0);
        assert!(tatkal.is_sold_out(200).await.unwrap());
    }

    #[tokio::test]
    async fn reset_and_delete() {
        let tatkal = inventory();
        tatkal.initialize(200, 5).await.unwrap();
        tatkal.try_reserve(200).await.unwrap();

        tatkal.reset(200, 10).await.unwrap();
        assert_eq!(tatkal.remaining(200).await.unwrap(), 10);

        tatkal.delete(200).await.unwrap();
        assert_eq!(tatkal.remaining(200).await.unwrap(), -1);
    }
}

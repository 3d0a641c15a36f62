use crowdgate_booking::BookingSaga;
use crowdgate_core::lock_store::LockStore;
use crowdgate_payment::PaymentEngine;
use crowdgate_reservation::{SeatLockService, TatkalInventory};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub seat_locks: Arc<SeatLockService>,
    pub tatkal: Arc<TatkalInventory>,
    pub saga: Arc<BookingSaga>,
    pub payments: Arc<PaymentEngine>,
    /// Shared with the rate-limit middleware for its counters.
    pub lock_store: Arc<dyn LockStore>,
    pub rate_limit_per_minute: i64,
}

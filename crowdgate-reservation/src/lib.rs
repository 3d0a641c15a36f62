pub mod seat_locks;
pub mod tatkal;

pub use seat_locks::{SeatLockService, SeatLockView};
pub use tatkal::TatkalInventory;

use crowdgate_core::lock_store::LockStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error(transparent)]
    Store(#[from] LockStoreError),
}

//! In-memory twins of the production adapters. Same contracts, no external
//! processes; used by the test suites and single-node development mode.

pub mod bus;
pub mod lock_store;
pub mod repos;

pub use bus::MemoryEventBus;
pub use lock_store::MemoryLockStore;
pub use repos::{MemoryBookingRepository, MemoryTransactionRepository};

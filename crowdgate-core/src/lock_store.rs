//! Atomic named-lock primitive with TTL, ownership values, and counters.
//!
//! Every operation is linearizable per key; nothing here is atomic across
//! keys. A crash never leaks a lock past its TTL, which is the safety net
//! for abandoned locks.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// `ttl` result when the key exists but carries no expiry.
pub const TTL_NONE: i64 = -1;
/// `ttl` result when the key is absent.
pub const TTL_MISSING: i64 = -2;

#[derive(Debug, Error)]
pub enum LockStoreError {
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
    #[error("value under key '{0}' is not an integer")]
    NotAnInteger(String),
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `value` under `key` only if no live entry exists. Returns
    /// whether the store occurred.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError>;

    /// Unconditional overwrite without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), LockStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError>;

    /// Refresh the TTL of a live entry; returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError>;

    /// Returns whether anything was removed.
    async fn delete(&self, key: &str) -> Result<bool, LockStoreError>;

    /// Compare-and-delete: remove only when the current value equals
    /// `expected`. The read and the delete are one atomic step.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockStoreError>;

    /// Atomic increment; a missing key counts from zero. Returns the
    /// post-operation value.
    async fn incr(&self, key: &str) -> Result<i64, LockStoreError>;

    /// Atomic decrement; may go negative, callers compensate.
    async fn decr(&self, key: &str) -> Result<i64, LockStoreError>;

    /// Enumerate live keys under a prefix. Possibly non-atomic; results may
    /// be stale by the time the caller looks at them.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, LockStoreError>;

    /// Remaining lifetime in seconds, [`TTL_NONE`] for a key without expiry,
    /// [`TTL_MISSING`] for an absent key.
    async fn ttl(&self, key: &str) -> Result<i64, LockStoreError>;
}

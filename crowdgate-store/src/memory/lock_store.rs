use async_trait::async_trait;
use crowdgate_core::lock_store::{LockStore, LockStoreError, TTL_MISSING, TTL_NONE};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Single-mutex key-value store. The mutex serialises every operation, which
/// trivially satisfies the per-key linearizability contract. Expiry is lazy:
/// a dead entry is dropped the next time its key is touched.
///
/// TTLs run on `tokio::time`, so tests can drive them with
/// `tokio::time::pause` and `advance`.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        f(&mut entries)
    }

    fn adjust(&self, key: &str, delta: i64) -> Result<i64, LockStoreError> {
        self.with_live_entries(|entries| match entries.get_mut(key) {
            Some(entry) => {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| LockStoreError::NotAnInteger(key.to_string()))?;
                let next = current + delta;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: delta.to_string(),
                        expires_at: None,
                    },
                );
                Ok(delta)
            }
        })
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        Ok(self.with_live_entries(|entries| {
            if entries.contains_key(key) {
                false
            } else {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_string(),
                        expires_at: Some(Instant::now() + ttl),
                    },
                );
                true
            }
        }))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LockStoreError> {
        self.with_live_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: None,
                },
            );
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        Ok(self.with_live_entries(|entries| entries.get(key).map(|e| e.value.clone())))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        Ok(self.with_live_entries(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool, LockStoreError> {
        Ok(self.with_live_entries(|entries| entries.remove(key).is_some()))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockStoreError> {
        Ok(self.with_live_entries(|entries| match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                true
            }
            _ => false,
        }))
    }

    async fn incr(&self, key: &str) -> Result<i64, LockStoreError> {
        self.adjust(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64, LockStoreError> {
        self.adjust(key, -1)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, LockStoreError> {
        Ok(self.with_live_entries(|entries| {
            entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        }))
    }

    async fn ttl(&self, key: &str) -> Result<i64, LockStoreError> {
        Ok(self.with_live_entries(|entries| match entries.get(key) {
            None => TTL_MISSING,
            Some(Entry {
                expires_at: None, ..
            }) => TTL_NONE,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(Instant::now());
                remaining.as_secs_f64().ceil() as i64
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn set_if_absent_stores_once() {
        let store = MemoryLockStore::new();
        assert!(store.set_if_absent("k", "a", TTL).await.unwrap());
        assert!(!store.set_if_absent("k", "b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        tokio::time::pause();
        let store = MemoryLockStore::new();
        store
            .set_if_absent("k", "a", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), TTL_MISSING);
        // Key is free again after expiry
        assert!(store.set_if_absent("k", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_equals_only_matches_exact_value() {
        let store = MemoryLockStore::new();
        store.set_if_absent("k", "owner-1", TTL).await.unwrap();

        assert!(!store.delete_if_equals("k", "owner-2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("owner-1".to_string()));
        assert!(store.delete_if_equals("k", "owner-1").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn counters_go_negative_and_back() {
        let store = MemoryLockStore::new();
        store.set("c", "1").await.unwrap();
        assert_eq!(store.decr("c").await.unwrap(), 0);
        assert_eq!(store.decr("c").await.unwrap(), -1);
        assert_eq!(store.incr("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn incr_on_missing_key_counts_from_zero() {
        let store = MemoryLockStore::new();
        assert_eq!(store.incr("fresh").await.unwrap(), 1);
        assert_eq!(store.decr("fresh2").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn incr_on_non_integer_is_an_error() {
        let store = MemoryLockStore::new();
        store.set("k", "owner-1").await.unwrap();
        assert!(matches!(
            store.incr("k").await,
            Err(LockStoreError::NotAnInteger(_))
        ));
    }

    #[tokio::test]
    async fn scan_filters_by_prefix() {
        let store = MemoryLockStore::new();
        store.set_if_absent("a:1", "x", TTL).await.unwrap();
        store.set_if_absent("a:2", "y", TTL).await.unwrap();
        store.set_if_absent("b:1", "z", TTL).await.unwrap();

        let mut keys = store.scan("a:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a:1".to_string(), "a:2".to_string()]);
    }

    #[tokio::test]
    async fn ttl_reports_remaining_and_sentinels() {
        tokio::time::pause();
        let store = MemoryLockStore::new();
        store
            .set_if_absent("k", "a", Duration::from_secs(600))
            .await
            .unwrap();
        store.set("plain", "v").await.unwrap();

        assert_eq!(store.ttl("k").await.unwrap(), 600);
        assert_eq!(store.ttl("plain").await.unwrap(), TTL_NONE);
        assert_eq!(store.ttl("absent").await.unwrap(), TTL_MISSING);
    }
}

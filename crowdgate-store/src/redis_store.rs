//! Redis-backed [`LockStore`]. Single-writer semantics per key come from
//! Redis itself; SET NX EX gives the atomic acquire and a Lua script gives
//! the atomic compare-and-delete.

use async_trait::async_trait;
use crowdgate_core::lock_store::{LockStore, LockStoreError};
use redis::AsyncCommands;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisLockStore {
    client: redis::Client,
}

fn store_err(key: &str, err: redis::RedisError) -> LockStoreError {
    if err.kind() == redis::ErrorKind::TypeError {
        LockStoreError::NotAnInteger(key.to_string())
    } else {
        LockStoreError::Unavailable(err.to_string())
    }
}

impl RedisLockStore {
    pub fn new(connection_string: &str) -> Result<Self, LockStoreError> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| LockStoreError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::Connection, LockStoreError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| LockStoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        let mut con = self.conn().await?;
        // SET NX EX: store only if the key does not exist, with expiry
        let stored: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut con)
            .await
            .map_err(|e| store_err(key, e))?;
        Ok(stored.is_some())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LockStoreError> {
        let mut con = self.conn().await?;
        con.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| store_err(key, e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        let mut con = self.conn().await?;
        con.get(key).await.map_err(|e| store_err(key, e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        let mut con = self.conn().await?;
        con.expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| store_err(key, e))
    }

    async fn delete(&self, key: &str) -> Result<bool, LockStoreError> {
        let mut con = self.conn().await?;
        let removed: i64 = con.del(key).await.map_err(|e| store_err(key, e))?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockStoreError> {
        let mut con = self.conn().await?;
        // GET+DEL must be one atomic step so a non-owner can never delete a
        // lock that changed hands between the read and the write.
        let script = redis::Script::new(
            r"if redis.call('GET', KEYS[1]) == ARGV[1] then
                  return redis.call('DEL', KEYS[1])
              else
                  return 0
              end",
        );
        let deleted: i64 = script
            .key(key)
            .arg(expected)
            .invoke_async(&mut con)
            .await
            .map_err(|e| store_err(key, e))?;
        Ok(deleted > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, LockStoreError> {
        let mut con = self.conn().await?;
        con.incr(key, 1i64).await.map_err(|e| store_err(key, e))
    }

    async fn decr(&self, key: &str) -> Result<i64, LockStoreError> {
        let mut con = self.conn().await?;
        con.decr(key, 1i64).await.map_err(|e| store_err(key, e))
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, LockStoreError> {
        let mut con = self.conn().await?;
        let pattern = format!("{}*", prefix);
        let mut keys = Vec::new();
        let mut iter = con
            .scan_match::<_, String>(pattern)
            .await
            .map_err(|e| store_err(prefix, e))?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<i64, LockStoreError> {
        let mut con = self.conn().await?;
        con.ttl(key).await.map_err(|e| store_err(key, e))
    }
}

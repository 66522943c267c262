//! Redis backed key/value store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::store::KvStore;

const SCAN_BATCH: usize = 500;

/// [`KvStore`] over a Redis server.
///
/// Redis uses the same `*`/`?` glob syntax, so patterns are passed through.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> RegistryResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> RegistryResult<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> RegistryResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;

        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RegistryError::not_found(key))
    }

    async fn set(&self, key: &str, value: String) -> RegistryResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn find_all(&self, pattern: &str) -> RegistryResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        keys.sort();
        keys.dedup();

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        debug!(pattern = %pattern, count = keys.len(), "Scanned registry keys");

        Ok(values
            .into_iter()
            .flatten()
            .filter(|v| !v.is_empty())
            .collect())
    }

    async fn destroy(&self, key: &str) -> RegistryResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> RegistryResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        if at <= Utc::now() {
            conn.del::<_, ()>(key).await?;
            return Ok(());
        }

        let applied: i64 = redis::cmd("EXPIREAT")
            .arg(key)
            .arg(at.timestamp())
            .query_async(&mut conn)
            .await?;

        if applied == 0 {
            return Err(RegistryError::not_found(key));
        }

        Ok(())
    }

    async fn persist(&self) -> RegistryResult<()> {
        Ok(())
    }
}

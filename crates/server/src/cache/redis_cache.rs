//! Shared product cache backed by Redis.
//!
//! Uses one multiplexed async connection; values are the same JSON snapshots
//! the in-process backend stores, written with `SET ... EX`.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{CacheError, ProductCache, ProductCacheKey};
use crate::models::Product;

/// Redis product cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to the Redis instance at `url`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Redis` if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProductCache for RedisCache {
    async fn get(&self, key: &ProductCacheKey) -> Result<Option<Product>, CacheError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(key.to_string()).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &ProductCacheKey,
        product: &Product,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(product)?;
        let mut conn = self.conn.clone();
        // Redis rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let (): () = conn.set_ex(key.to_string(), json, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &ProductCacheKey) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let (): () = conn.del(key.to_string()).await?;
        Ok(())
    }
}

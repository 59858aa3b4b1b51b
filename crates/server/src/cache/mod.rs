//! Read-through product cache.
//!
//! Products are cached as JSON under `product:<id>` with a bounded TTL. The
//! cache is never authoritative: reads fall back to the store on a miss or a
//! backend error, and writes go through [`CacheWriter`] so population and
//! invalidation never block a request.
//!
//! Backends:
//! - [`InProcessCache`] - `moka` with a per-entry TTL (default)
//! - `RedisCache` - shared Redis instance (`redis` feature)

pub mod in_process;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod writer;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use marketplace_core::ProductId;

use crate::models::Product;

pub use in_process::InProcessCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
pub use writer::CacheWriter;

/// Errors raised by a cache backend. Callers log them and carry on.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Entry could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis command failed.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Cache key for a product snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProductCacheKey(ProductId);

impl ProductCacheKey {
    #[must_use]
    pub const fn new(id: ProductId) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.0
    }
}

impl fmt::Display for ProductCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product:{}", self.0)
    }
}

/// A product cache backend.
#[async_trait]
pub trait ProductCache: Send + Sync + 'static {
    /// `Ok(None)` on a miss.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails or the entry cannot be decoded.
    async fn get(&self, key: &ProductCacheKey) -> Result<Option<Product>, CacheError>;

    /// Store a snapshot that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    async fn set(
        &self,
        key: &ProductCacheKey,
        product: &Product,
        ttl: std::time::Duration,
    ) -> Result<(), CacheError>;

    /// Remove an entry. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails.
    async fn delete(&self, key: &ProductCacheKey) -> Result<(), CacheError>;
}

/// Cache reads plus the background writer, as used by the catalog.
#[derive(Clone)]
pub struct CacheLayer {
    cache: Arc<dyn ProductCache>,
    writer: CacheWriter,
}

impl fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl CacheLayer {
    #[must_use]
    pub const fn new(cache: Arc<dyn ProductCache>, writer: CacheWriter) -> Self {
        Self { cache, writer }
    }

    /// Cached snapshot of a product. Backend errors are logged and reported
    /// as a miss.
    pub async fn get(&self, id: ProductId) -> Option<Product> {
        let key = ProductCacheKey::new(id);
        match self.cache.get(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(product_id = %id, error = %e, "cache read failed, falling back to store");
                None
            }
        }
    }

    /// Background writer for population and invalidation.
    #[must_use]
    pub const fn writer(&self) -> &CacheWriter {
        &self.writer
    }
}

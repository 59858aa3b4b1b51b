//! In-process cache backed by `moka`.
//!
//! Entries are stored as serialized JSON so the in-process and Redis
//! backends share one wire format, and each entry carries its own TTL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::{CacheError, ProductCache, ProductCacheKey};
use crate::models::Product;

#[derive(Debug, Clone)]
struct Entry {
    json: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// `moka` product cache.
#[derive(Clone)]
pub struct InProcessCache {
    cache: Cache<String, Entry>,
}

impl std::fmt::Debug for InProcessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl InProcessCache {
    /// Create a cache holding at most `max_capacity` products.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Store a raw JSON entry.
    pub async fn insert_raw(&self, key: &ProductCacheKey, json: String, ttl: Duration) {
        self.cache.insert(key.to_string(), Entry { json, ttl }).await;
    }
}

#[async_trait]
impl ProductCache for InProcessCache {
    async fn get(&self, key: &ProductCacheKey) -> Result<Option<Product>, CacheError> {
        match self.cache.get(&key.to_string()).await {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.json)?)),
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
        self.insert_raw(key, json, ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &ProductCacheKey) -> Result<(), CacheError> {
        self.cache.invalidate(&key.to_string()).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use marketplace_core::{CurrencyCode, ProductId, ShopId};

    use super::*;

    fn product(id: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(id),
            shop_id: ShopId::new(1),
            sku: None,
            name: "Oolong".to_owned(),
            slug: "oolong".to_owned(),
            description: None,
            price: Decimal::new(799, 2),
            currency: CurrencyCode::GBP,
            quantity: 8,
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InProcessCache::new(100);
        let key = ProductCacheKey::new(ProductId::new(5));

        assert!(cache.get(&key).await.unwrap().is_none());
        let stored = product(5);
        cache
            .set(&key, &stored, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(stored));
        cache.delete(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = InProcessCache::new(100);
        let key = ProductCacheKey::new(ProductId::new(6));
        cache
            .set(&key, &product(6), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let cache = InProcessCache::new(10);
        let key = ProductCacheKey::new(ProductId::new(7));
        cache
            .insert_raw(&key, "{not json".to_owned(), Duration::from_secs(60))
            .await;
        assert!(matches!(
            cache.get(&key).await,
            Err(CacheError::Serialization(_))
        ));
    }
}

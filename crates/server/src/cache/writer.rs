//! Background cache writer.
//!
//! Requests enqueue population and invalidation commands on a bounded
//! channel. One worker task applies them in order.
//!
//! Populations are best effort: when the queue is full the snapshot is
//! dropped with a warning and the next read goes to the store again.
//! Invalidations are never dropped. A full queue makes the caller wait for
//! room, and a stopped worker makes the caller delete the entry itself.
//!
//! A read that races an update can queue its pre-update snapshot after the
//! update's invalidation. Each invalidation therefore leaves a watermark:
//! the `updated_at` of the written row, or "forever" for a deleted product.
//! The worker skips any later population whose snapshot is older than the
//! watermark. Watermarks are forgotten once they are older than the entry
//! TTL.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use marketplace_core::ProductId;

use super::{ProductCache, ProductCacheKey};
use crate::models::Product;

enum CacheCommand {
    Populate(Box<Product>),
    Invalidate {
        id: ProductId,
        /// Snapshots updated before this instant are stale.
        fresh_from: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle for queueing cache writes. Cheap to clone.
#[derive(Clone)]
pub struct CacheWriter {
    tx: mpsc::Sender<CacheCommand>,
    cache: Arc<dyn ProductCache>,
}

impl fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWriter")
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish_non_exhaustive()
    }
}

impl CacheWriter {
    /// Spawn the worker task.
    ///
    /// The worker exits once every handle has been dropped and the queue has
    /// drained.
    #[must_use]
    pub fn spawn(
        cache: Arc<dyn ProductCache>,
        ttl: Duration,
        queue_depth: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let handle = tokio::spawn(run(Arc::clone(&cache), ttl, rx));
        (Self { tx, cache }, handle)
    }

    /// Queue a snapshot of `product` for caching. Dropped if the queue is full.
    pub fn populate(&self, product: &Product) {
        match self
            .tx
            .try_send(CacheCommand::Populate(Box::new(product.clone())))
        {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(product_id = %product.id, "cache write queue full, dropping population");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(product_id = %product.id, "cache writer stopped, dropping population");
            }
        }
    }

    /// Remove the cached entry for a product that was just written.
    ///
    /// Snapshots older than `product.updated_at` will not be cached again.
    pub async fn invalidate(&self, product: &Product) {
        self.send_invalidation(product.id, product.updated_at).await;
    }

    /// Remove the cached entry for a product that was just deleted. No
    /// snapshot of it will be cached again.
    pub async fn invalidate_deleted(&self, id: ProductId) {
        self.send_invalidation(id, DateTime::<Utc>::MAX_UTC).await;
    }

    /// Wait until every command queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(CacheCommand::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    async fn send_invalidation(&self, id: ProductId, fresh_from: DateTime<Utc>) {
        let command = CacheCommand::Invalidate { id, fresh_from };
        let sent = match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                debug!(product_id = %id, "cache write queue full, waiting to invalidate");
                self.tx.send(command).await.is_ok()
            }
            Err(TrySendError::Closed(_)) => false,
        };
        if sent {
            return;
        }

        let key = ProductCacheKey::new(id);
        match self.cache.delete(&key).await {
            Ok(()) => debug!(%key, "cache writer stopped, invalidated inline"),
            Err(e) => warn!(%key, error = %e, "failed to invalidate cached product"),
        }
    }
}

async fn run(cache: Arc<dyn ProductCache>, ttl: Duration, mut rx: mpsc::Receiver<CacheCommand>) {
    let mut watermarks: HashMap<ProductId, (DateTime<Utc>, Instant)> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            CacheCommand::Populate(product) => {
                let key = ProductCacheKey::new(product.id);
                let stale = watermarks
                    .get(&product.id)
                    .is_some_and(|(fresh_from, _)| product.updated_at < *fresh_from);
                if stale {
                    debug!(%key, "skipped stale snapshot");
                    continue;
                }
                match cache.set(&key, &product, ttl).await {
                    Ok(()) => debug!(%key, "cached product"),
                    Err(e) => warn!(%key, error = %e, "failed to cache product"),
                }
            }
            CacheCommand::Invalidate { id, fresh_from } => {
                watermarks.retain(|_, (_, at)| at.elapsed() < ttl);
                let mark = watermarks.entry(id).or_insert((fresh_from, Instant::now()));
                *mark = (mark.0.max(fresh_from), Instant::now());

                let key = ProductCacheKey::new(id);
                match cache.delete(&key).await {
                    Ok(()) => debug!(%key, "invalidated cached product"),
                    Err(e) => warn!(%key, error = %e, "failed to invalidate cached product"),
                }
            }
            CacheCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("cache writer stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use rust_decimal::Decimal;

    use marketplace_core::{CurrencyCode, ShopId};

    use super::*;
    use crate::cache::InProcessCache;

    const TTL: Duration = Duration::from_secs(60);

    fn product(id: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(id),
            shop_id: ShopId::new(1),
            sku: None,
            name: "Sencha".to_owned(),
            slug: "sencha".to_owned(),
            description: None,
            price: Decimal::new(1200, 2),
            currency: CurrencyCode::JPY,
            quantity: 3,
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_populate_then_invalidate_in_order() {
        let cache = Arc::new(InProcessCache::new(10));
        let (writer, _handle) = CacheWriter::spawn(cache.clone(), TTL, 8);
        let key = ProductCacheKey::new(ProductId::new(1));

        writer.populate(&product(1));
        writer.flush().await;
        assert!(cache.get(&key).await.unwrap().is_some());

        writer.invalidate(&product(1)).await;
        writer.flush().await;
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidation_waits_for_room_in_full_queue() {
        let cache = Arc::new(InProcessCache::new(10));
        let before = product(1);
        let key = ProductCacheKey::new(before.id);
        cache.set(&key, &before, TTL).await.unwrap();

        let (writer, _handle) = CacheWriter::spawn(cache.clone(), TTL, 1);
        // The worker has not run yet on this single-threaded runtime, so
        // this fills the only slot.
        writer.populate(&product(2));

        let mut after = before.clone();
        after.price = Decimal::new(2000, 2);
        after.updated_at = before.updated_at + TimeDelta::seconds(1);
        writer.invalidate(&after).await;
        writer.flush().await;

        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(
            cache
                .get(&ProductCacheKey::new(ProductId::new(2)))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_population_dropped_when_queue_full() {
        let cache = Arc::new(InProcessCache::new(10));
        let (writer, _handle) = CacheWriter::spawn(cache.clone(), TTL, 1);
        writer.populate(&product(1));
        writer.populate(&product(2));
        writer.flush().await;

        assert!(cache.get(&ProductCacheKey::new(ProductId::new(1))).await.unwrap().is_some());
        assert!(cache.get(&ProductCacheKey::new(ProductId::new(2))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidation_after_worker_stopped_deletes_inline() {
        let cache = Arc::new(InProcessCache::new(10));
        let stale = product(3);
        let key = ProductCacheKey::new(stale.id);
        cache.set(&key, &stale, TTL).await.unwrap();

        let (writer, handle) = CacheWriter::spawn(cache.clone(), TTL, 4);
        handle.abort();
        let _ = handle.await;

        writer.invalidate_deleted(stale.id).await;
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_older_than_invalidation_is_skipped() {
        let cache = Arc::new(InProcessCache::new(10));
        let (writer, _handle) = CacheWriter::spawn(cache.clone(), TTL, 8);

        let before = product(4);
        let mut after = before.clone();
        after.price = Decimal::new(2000, 2);
        after.updated_at = before.updated_at + TimeDelta::seconds(1);
        let key = ProductCacheKey::new(before.id);

        // A reader loaded `before`, then the update invalidated, then the
        // reader's population arrived.
        writer.invalidate(&after).await;
        writer.populate(&before);
        writer.flush().await;
        assert!(cache.get(&key).await.unwrap().is_none());

        writer.populate(&after);
        writer.flush().await;
        assert_eq!(cache.get(&key).await.unwrap().unwrap().price, after.price);
    }

    #[tokio::test]
    async fn test_deleted_product_is_never_repopulated() {
        let cache = Arc::new(InProcessCache::new(10));
        let (writer, _handle) = CacheWriter::spawn(cache.clone(), TTL, 8);
        let gone = product(5);

        writer.invalidate_deleted(gone.id).await;
        writer.populate(&gone);
        writer.flush().await;
        assert!(cache.get(&ProductCacheKey::new(gone.id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_worker_exits_when_handles_dropped() {
        let cache = Arc::new(InProcessCache::new(10));
        let (writer, handle) = CacheWriter::spawn(cache, TTL, 8);
        writer.populate(&product(2));
        drop(writer);
        handle.await.unwrap();
    }
}

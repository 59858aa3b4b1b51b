//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::{CacheLayer, CacheWriter};
use crate::config::OrderConfig;
use crate::db::Store;
use crate::services::{OrderService, ProductService, ShopService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and gives handlers the
/// services built over one store.
pub struct AppState<S> {
    inner: Arc<AppStateInner<S>>,
}

// Manual impl: cloning the `Arc` does not require `S: Clone`.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<S> {
    orders: OrderService<S>,
    products: ProductService<S>,
    shops: ShopService<S>,
    cache: CacheLayer,
}

impl<S: Store> AppState<S> {
    /// Build the services over `store`.
    #[must_use]
    pub fn new(store: S, cache: CacheLayer, order: &OrderConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orders: OrderService::new(store.clone(), order.transaction_timeout),
                products: ProductService::new(store.clone(), cache.clone()),
                shops: ShopService::new(store),
                cache,
            }),
        }
    }

    /// Order placement and reads.
    #[must_use]
    pub fn orders(&self) -> &OrderService<S> {
        &self.inner.orders
    }

    /// Product catalog.
    #[must_use]
    pub fn products(&self) -> &ProductService<S> {
        &self.inner.products
    }

    /// Shop management.
    #[must_use]
    pub fn shops(&self) -> &ShopService<S> {
        &self.inner.shops
    }

    /// Background cache writer, flushed on shutdown.
    #[must_use]
    pub fn cache_writer(&self) -> &CacheWriter {
        self.inner.cache.writer()
    }
}

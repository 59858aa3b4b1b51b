//! Integration tests for the marketplace back end.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketplace-integration-tests
//! ```
//!
//! Every test runs against [`MemoryStore`] and the in-process cache, so no
//! external services are needed.
//!
//! # Test Categories
//!
//! - `order_placement` - order scenarios, atomicity, stock and currency rules
//! - `concurrency` - buyers racing for the same stock
//! - `product_cache` - read-aside population and write invalidation
//! - `http_api` - the axum router end to end

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rust_decimal::Decimal;

use marketplace_core::{CurrencyCode, ProductId, Role, UserId};
use marketplace_server::cache::{CacheLayer, CacheWriter, InProcessCache, ProductCache};
use marketplace_server::config::OrderConfig;
use marketplace_server::db::{MemoryStore, ProductStore, Store};
use marketplace_server::models::{Actor, CreateProductInput, CreateShopInput, Product, Shop};
use marketplace_server::routes;
use marketplace_server::state::AppState;

/// Cache TTL used by test contexts.
pub const TEST_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cache writer queue depth used by test contexts.
pub const TEST_CACHE_QUEUE_DEPTH: usize = 64;

/// Services, store and cache wired the way `main` wires them.
pub struct TestContext<S = MemoryStore> {
    pub store: S,
    pub cache: Arc<InProcessCache>,
    pub state: AppState<S>,
}

impl TestContext<MemoryStore> {
    /// Fresh in-memory context with the default order timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), &OrderConfig::default())
    }

    /// Fresh in-memory context with a custom transaction timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_store(
            MemoryStore::new(),
            &OrderConfig {
                transaction_timeout: timeout,
            },
        )
    }

    /// Fresh in-memory context whose cache writer queue holds `depth` commands.
    #[must_use]
    pub fn with_cache_queue_depth(depth: usize) -> Self {
        Self::wire(MemoryStore::new(), &OrderConfig::default(), depth)
    }
}

impl Default for TestContext<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> TestContext<S> {
    /// Wire services over `store`.
    pub fn with_store(store: S, order: &OrderConfig) -> Self {
        Self::wire(store, order, TEST_CACHE_QUEUE_DEPTH)
    }

    fn wire(store: S, order: &OrderConfig, queue_depth: usize) -> Self {
        let cache = Arc::new(InProcessCache::new(1_000));
        let backend: Arc<dyn ProductCache> = cache.clone();
        let (writer, _worker) =
            CacheWriter::spawn(Arc::clone(&backend), TEST_CACHE_TTL, queue_depth);
        let state = AppState::new(store.clone(), CacheLayer::new(backend, writer), order);
        Self {
            store,
            cache,
            state,
        }
    }

    /// Router over this context's state.
    pub fn router(&self) -> Router {
        routes::app(self.state.clone())
    }

    /// Create a shop owned by `owner`.
    ///
    /// # Panics
    ///
    /// Panics if the shop is rejected.
    pub async fn shop(&self, owner: &Actor, name: &str) -> Shop {
        self.state
            .shops()
            .create_shop(
                owner,
                CreateShopInput {
                    name: name.to_owned(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_or_else(|e| panic!("create shop {name}: {e}"))
    }

    /// Create a product in `shop`, acting as its owner.
    ///
    /// # Panics
    ///
    /// Panics if the product is rejected.
    pub async fn product(
        &self,
        shop: &Shop,
        name: &str,
        price: &str,
        currency: CurrencyCode,
        quantity: i32,
    ) -> Product {
        let owner = Actor::new(shop.owner_id, Role::Shopkeeper);
        self.state
            .products()
            .create_product(
                &owner,
                CreateProductInput {
                    shop_id: shop.id,
                    sku: Some(format!("SKU-{}", name.to_uppercase().replace(' ', "-"))),
                    name: name.to_owned(),
                    description: None,
                    price: dec(price),
                    currency,
                    quantity,
                    active: true,
                },
            )
            .await
            .unwrap_or_else(|e| panic!("create product {name}: {e}"))
    }

    /// Current authoritative stock, bypassing the cache.
    ///
    /// # Panics
    ///
    /// Panics if the product does not exist.
    pub async fn stock(&self, id: ProductId) -> i32 {
        self.store
            .get_product(id)
            .await
            .unwrap_or_else(|e| panic!("read product {id}: {e}"))
            .quantity
    }

    /// Wait for queued cache writes to land.
    pub async fn settle_cache(&self) {
        self.state.cache_writer().flush().await;
    }
}

/// A shopkeeper with the given id.
#[must_use]
pub const fn shopkeeper(id: i64) -> Actor {
    Actor::new(UserId::new(id), Role::Shopkeeper)
}

/// A plain buyer with the given id.
#[must_use]
pub const fn buyer(id: i64) -> Actor {
    Actor::new(UserId::new(id), Role::User)
}

/// An admin with the given id.
#[must_use]
pub const fn admin(id: i64) -> Actor {
    Actor::new(UserId::new(id), Role::Admin)
}

/// Parse a decimal literal.
///
/// # Panics
///
/// Panics on a malformed literal.
#[must_use]
pub fn dec(value: &str) -> Decimal {
    value
        .parse()
        .unwrap_or_else(|e| panic!("bad decimal {value}: {e}"))
}

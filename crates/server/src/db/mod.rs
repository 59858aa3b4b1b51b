//! Persistence for products, shops and orders.
//!
//! # Stores
//!
//! The services depend on the traits in this module, not on a backend:
//!
//! - [`ProductStore`] - product CRUD (plain, non-transactional)
//! - [`ShopStore`] - shop CRUD, used to resolve ownership
//! - [`OrderStore`] - order reads and transaction acquisition
//! - [`StoreTransaction`] - the operations that only make sense inside a
//!   transaction: locked product reads, guarded stock decrements and the
//!   atomic order insert
//!
//! Two backends implement them:
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx (`SELECT ... FOR UPDATE` row locks)
//! - [`MemoryStore`] - in-process tables with per-row async locks, used by
//!   tests and `MARKETPLACE_STORE=memory`
//!
//! # Database: `marketplace` schema
//!
//! - `shops`, `products` - catalog, soft-deleted via `deleted_at`
//! - `orders`, `order_items` - orders with price snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p marketplace-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod products;
pub mod shops;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use marketplace_core::{OrderId, ProductId, ShopId, UserId};

use crate::config::DatabaseConfig;
use crate::models::{
    NewOrder, NewOrderItem, NewProduct, NewShop, Order, OrderItem, Product, ProductChanges, Shop,
    ShopChanges,
};

pub use memory::{MemoryStore, MemoryTransaction};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found (or is soft-deleted).
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., a product referencing a missing shop).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map sqlx errors, translating constraint violations into `Conflict`.
pub(crate) fn translate_error(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(ref db_err)
            if db_err.is_foreign_key_violation()
                || db_err.is_check_violation()
                || db_err.is_unique_violation() =>
        {
            RepositoryError::Conflict(db_err.message().to_owned())
        }
        other => RepositoryError::Database(other),
    }
}

/// Default page size when the caller asks for `limit <= 0`.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Offset-based pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Build a page, clamping `limit <= 0` to [`DEFAULT_PAGE_LIMIT`] and
    /// `offset < 0` to zero.
    #[must_use]
    pub const fn clamped(limit: i64, offset: i64) -> Self {
        Self {
            limit: if limit <= 0 { DEFAULT_PAGE_LIMIT } else { limit },
            offset: if offset < 0 { 0 } else { offset },
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::clamped(0, 0)
    }
}

/// Result of a guarded stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Decrement {
    /// Exactly one row changed.
    Applied,
    /// The `quantity >= amount` guard matched no row.
    Insufficient,
}

/// Plain product operations.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Get a live product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is missing or soft-deleted.
    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError>;

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the shop does not exist.
    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError>;

    /// Apply the supplied fields to a live product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no live product matched.
    async fn update_product(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError>;

    /// Mark a live product as deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no live product matched.
    async fn soft_delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Live products of a shop, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    async fn list_products_by_shop(
        &self,
        shop_id: ShopId,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError>;
}

/// Plain shop operations.
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// Get a live shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop is missing or soft-deleted.
    async fn get_shop(&self, id: ShopId) -> Result<Shop, RepositoryError>;

    /// Insert a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    async fn create_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError>;

    /// Apply the supplied fields to a live shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no live shop matched.
    async fn update_shop(&self, id: ShopId, changes: &ShopChanges) -> Result<Shop, RepositoryError>;

    /// Mark a live shop as deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no live shop matched.
    async fn soft_delete_shop(&self, id: ShopId) -> Result<(), RepositoryError>;

    /// Live shops of an owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    async fn list_shops_by_owner(
        &self,
        owner_id: UserId,
        page: Page,
    ) -> Result<Vec<Shop>, RepositoryError>;
}

/// Order reads and transaction acquisition.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Transaction handle. Dropping it without [`StoreTransaction::commit`]
    /// rolls back every write made through it and releases its row locks.
    type Tx: StoreTransaction;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if no connection could be acquired.
    async fn begin(&self) -> Result<Self::Tx, RepositoryError>;

    /// Get a live order and its items (possibly empty).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order is missing or soft-deleted.
    async fn get_order(&self, id: OrderId) -> Result<(Order, Vec<OrderItem>), RepositoryError>;

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the backend does not answer.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Operations scoped to an open transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read a live product and hold an exclusive lock on its row until the
    /// transaction ends.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is missing or soft-deleted.
    async fn locked_get_product(&mut self, id: ProductId) -> Result<Product, RepositoryError>;

    /// Decrement stock by `amount` only if at least `amount` units remain.
    ///
    /// The guard is evaluated by the write itself, so a stale earlier read
    /// can never oversell.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        amount: i32,
    ) -> Result<Decrement, RepositoryError>;

    /// Insert the order header and every item row.
    ///
    /// # Errors
    ///
    /// Returns an error if any row fails to insert; the caller must abandon
    /// the transaction.
    async fn create_order_with_items(
        &mut self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<OrderId, RepositoryError>;

    /// Make every write durable and release all locks.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the commit fails; nothing is
    /// applied in that case.
    async fn commit(self) -> Result<(), RepositoryError>;
}

/// Everything the HTTP layer needs from a backend.
pub trait Store: ProductStore + ShopStore + OrderStore + Clone + 'static {}

impl<T> Store for T where T: ProductStore + ShopStore + OrderStore + Clone + 'static {}

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    config: &DatabaseConfig,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps_limit_and_offset() {
        assert_eq!(
            Page::clamped(0, -3),
            Page {
                limit: DEFAULT_PAGE_LIMIT,
                offset: 0
            }
        );
        assert_eq!(Page::clamped(-1, 5).limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(Page::clamped(50, 10), Page { limit: 50, offset: 10 });
        assert_eq!(Page::default().limit, 20);
    }

    #[test]
    fn test_translate_row_not_found() {
        assert!(matches!(
            translate_error(sqlx::Error::RowNotFound),
            RepositoryError::NotFound
        ));
        assert!(matches!(
            translate_error(sqlx::Error::PoolClosed),
            RepositoryError::Database(_)
        ));
    }
}

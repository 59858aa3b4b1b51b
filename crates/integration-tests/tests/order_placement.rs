//! Integration tests for order placement.
//!
//! These tests drive `OrderService` through the same wiring the server uses
//! and check the all-or-nothing contract: an order either commits together
//! with every stock decrement, or leaves no trace.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use async_trait::async_trait;

use marketplace_core::{CurrencyCode, OrderId, OrderStatus, ProductId, ShopId, UserId};
use marketplace_integration_tests::{TestContext, admin, buyer, dec, shopkeeper};
use marketplace_server::config::OrderConfig;
use marketplace_server::db::{
    Decrement, MemoryStore, MemoryTransaction, OrderStore, Page, ProductStore, RepositoryError,
    ShopStore, StoreTransaction,
};
use marketplace_server::models::{
    NewOrder, NewOrderItem, NewProduct, NewShop, Order, OrderItem, OrderLine, Product,
    ProductChanges, Shop, ShopChanges,
};
use marketplace_server::services::{Entity, InfrastructureError, ServiceError};

fn line(product: &Product, quantity: i32) -> OrderLine {
    OrderLine {
        product_id: product.id,
        quantity,
    }
}

// =============================================================================
// Concrete Scenarios
// =============================================================================

#[tokio::test]
async fn test_order_commits_total_and_decrements_stock() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;

    let order_id = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 3)], None)
        .await
        .unwrap();

    let placed = ctx.state.orders().get_order(order_id).await.unwrap();
    assert_eq!(placed.order.total, dec("30.00"));
    assert_eq!(placed.order.currency, CurrencyCode::USD);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.buyer_id, UserId::new(1));
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].quantity, 3);
    assert_eq!(placed.items[0].total_price, dec("30.00"));
    assert_eq!(ctx.stock(tea.id).await, 2);
}

#[tokio::test]
async fn test_insufficient_stock_creates_nothing() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 2)
        .await;

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 5)], None)
        .await
        .unwrap_err();

    match err {
        ServiceError::InsufficientStock {
            product_id,
            available,
            requested,
            ..
        } => {
            assert_eq!(product_id, tea.id);
            assert_eq!(available, 2);
            assert_eq!(requested, 5);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(ctx.stock(tea.id).await, 2);
    assert_eq!(ctx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_mixed_currency_creates_nothing() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let usd = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;
    let eur = ctx
        .product(&shop, "Darjeeling", "8.00", CurrencyCode::EUR, 5)
        .await;

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&usd, 2), line(&eur, 1)], None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::MixedCurrency {
            expected: CurrencyCode::USD,
            found: CurrencyCode::EUR,
            ..
        }
    ));
    assert_eq!(ctx.stock(usd.id).await, 5);
    assert_eq!(ctx.stock(eur.id).await, 5);
    assert_eq!(ctx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_missing_order_is_not_found() {
    let ctx = TestContext::new();
    let err = ctx
        .state
        .orders()
        .get_order(OrderId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            entity: Entity::Order,
            id: 999
        }
    ));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_unknown_product_rolls_back_earlier_lines() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;

    let lines = [
        line(&tea, 1),
        OrderLine {
            product_id: ProductId::new(4040),
            quantity: 1,
        },
    ];
    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &lines, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::NotFound {
            entity: Entity::Product,
            id: 4040
        }
    ));
    assert_eq!(ctx.stock(tea.id).await, 5);
    assert_eq!(ctx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_soft_deleted_product_cannot_be_ordered() {
    let ctx = TestContext::new();
    let owner = shopkeeper(10);
    let shop = ctx.shop(&owner, "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;
    ctx.state
        .products()
        .delete_product(&owner, tea.id)
        .await
        .unwrap();

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 1)], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn test_rejects_empty_and_non_positive_lines() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;
    let orders = ctx.state.orders();

    assert!(matches!(
        orders.create_order(UserId::new(1), &[], None).await,
        Err(ServiceError::InvalidInput(_))
    ));
    assert!(matches!(
        orders
            .create_order(UserId::new(1), &[line(&tea, 0)], None)
            .await,
        Err(ServiceError::InvalidInput(_))
    ));
    assert!(matches!(
        orders
            .create_order(UserId::new(1), &[line(&tea, 1)], Some("x".repeat(1001)))
            .await,
        Err(ServiceError::InvalidInput(_))
    ));
    assert_eq!(ctx.stock(tea.id).await, 5);
}

#[tokio::test]
async fn test_duplicate_lines_share_one_stock_pool() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;

    // 3 + 3 > 5 even though each line alone fits
    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 3), line(&tea, 3)], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InsufficientStock {
            available: 2,
            requested: 3,
            ..
        }
    ));
    assert_eq!(ctx.stock(tea.id).await, 5);

    let order_id = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 2), line(&tea, 3)], None)
        .await
        .unwrap();
    let placed = ctx.state.orders().get_order(order_id).await.unwrap();
    assert_eq!(placed.items.len(), 2);
    assert_eq!(placed.order.total, dec("50.00"));
    assert_eq!(ctx.stock(tea.id).await, 0);
}

#[tokio::test]
async fn test_multi_line_total_and_note() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let sencha = ctx
        .product(&shop, "Sencha", "12.50", CurrencyCode::USD, 10)
        .await;
    let kettle = ctx
        .product(&shop, "Kettle", "39.99", CurrencyCode::USD, 3)
        .await;

    let order_id = ctx
        .state
        .orders()
        .create_order(
            UserId::new(2),
            &[line(&sencha, 4), line(&kettle, 1)],
            Some("gift wrap".to_owned()),
        )
        .await
        .unwrap();

    let placed = ctx.state.orders().get_order(order_id).await.unwrap();
    assert_eq!(placed.order.total, dec("89.99"));
    assert_eq!(placed.order.note.as_deref(), Some("gift wrap"));
    assert_eq!(ctx.stock(sencha.id).await, 6);
    assert_eq!(ctx.stock(kettle.id).await, 2);
}

// =============================================================================
// Price Snapshotting
// =============================================================================

#[tokio::test]
async fn test_price_change_does_not_touch_placed_order() {
    let ctx = TestContext::new();
    let owner = shopkeeper(10);
    let shop = ctx.shop(&owner, "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;

    let order_id = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 2)], None)
        .await
        .unwrap();

    ctx.state
        .products()
        .update_product(
            &owner,
            tea.id,
            ProductChanges {
                price: Some(dec("99.00")),
                name: Some("Sencha Reserve".to_owned()),
                ..ProductChanges::default()
            },
        )
        .await
        .unwrap();

    let placed = ctx.state.orders().get_order(order_id).await.unwrap();
    assert_eq!(placed.items[0].unit_price, dec("10.00"));
    assert_eq!(placed.items[0].name, "Sencha");
    assert_eq!(placed.order.total, dec("20.00"));
}

// =============================================================================
// Order Access
// =============================================================================

#[tokio::test]
async fn test_order_readable_by_buyer_and_admin_only() {
    let ctx = TestContext::new();
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;
    let order_id = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 1)], None)
        .await
        .unwrap();

    let orders = ctx.state.orders();
    assert!(orders.get_order_for(&buyer(1), order_id).await.is_ok());
    assert!(orders.get_order_for(&admin(99), order_id).await.is_ok());
    assert!(matches!(
        orders.get_order_for(&buyer(2), order_id).await,
        Err(ServiceError::PermissionDenied(_))
    ));
}

// =============================================================================
// Timeout
// =============================================================================

#[tokio::test]
async fn test_transaction_timeout_rolls_back() {
    let ctx = TestContext::with_timeout(Duration::from_millis(100));
    let shop = ctx.shop(&shopkeeper(10), "Tea House").await;
    let tea = ctx
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;

    // Another transaction holds the row lock for longer than the timeout
    let mut holder = ctx.store.begin().await.unwrap();
    holder.locked_get_product(tea.id).await.unwrap();

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 1)], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Infrastructure(InfrastructureError::Timeout(_))
    ));
    assert!(err.is_infrastructure());

    drop(holder);
    assert_eq!(ctx.stock(tea.id).await, 5);
    assert_eq!(ctx.store.order_count().await, 0);

    // Lock released: the same order now goes through
    ctx.state
        .orders()
        .create_order(UserId::new(1), &[line(&tea, 1)], None)
        .await
        .unwrap();
    assert_eq!(ctx.stock(tea.id).await, 4);
}

// =============================================================================
// Atomicity Under Store Failures
// =============================================================================

/// Where the wrapped store injects a failure.
#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Decrementing this product fails after the order rows were staged.
    Decrement(ProductId),
    /// The commit itself fails.
    Commit,
    /// The commit reports a constraint conflict.
    CommitConflict,
}

/// `MemoryStore` wrapper whose transactions fail at a chosen step.
#[derive(Debug, Clone)]
struct FailingStore {
    inner: MemoryStore,
    fault: Fault,
}

struct FailingTx {
    inner: MemoryTransaction,
    fault: Fault,
}

fn injected() -> RepositoryError {
    RepositoryError::DataCorruption("injected failure".to_owned())
}

#[async_trait]
impl ProductStore for FailingStore {
    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        self.inner.get_product(id).await
    }

    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        self.inner.create_product(input).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError> {
        self.inner.update_product(id, changes).await
    }

    async fn soft_delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        self.inner.soft_delete_product(id).await
    }

    async fn list_products_by_shop(
        &self,
        shop_id: ShopId,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        self.inner.list_products_by_shop(shop_id, page).await
    }
}

#[async_trait]
impl ShopStore for FailingStore {
    async fn get_shop(&self, id: ShopId) -> Result<Shop, RepositoryError> {
        self.inner.get_shop(id).await
    }

    async fn create_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError> {
        self.inner.create_shop(input).await
    }

    async fn update_shop(&self, id: ShopId, changes: &ShopChanges) -> Result<Shop, RepositoryError> {
        self.inner.update_shop(id, changes).await
    }

    async fn soft_delete_shop(&self, id: ShopId) -> Result<(), RepositoryError> {
        self.inner.soft_delete_shop(id).await
    }

    async fn list_shops_by_owner(
        &self,
        owner_id: UserId,
        page: Page,
    ) -> Result<Vec<Shop>, RepositoryError> {
        self.inner.list_shops_by_owner(owner_id, page).await
    }
}

#[async_trait]
impl OrderStore for FailingStore {
    type Tx = FailingTx;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError> {
        Ok(FailingTx {
            inner: self.inner.begin().await?,
            fault: self.fault,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<(Order, Vec<OrderItem>), RepositoryError> {
        self.inner.get_order(id).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.ping().await
    }
}

#[async_trait]
impl StoreTransaction for FailingTx {
    async fn locked_get_product(&mut self, id: ProductId) -> Result<Product, RepositoryError> {
        self.inner.locked_get_product(id).await
    }

    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        amount: i32,
    ) -> Result<Decrement, RepositoryError> {
        match self.fault {
            Fault::Decrement(target) if target == id => Err(injected()),
            _ => self.inner.conditional_decrement(id, amount).await,
        }
    }

    async fn create_order_with_items(
        &mut self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<OrderId, RepositoryError> {
        self.inner.create_order_with_items(order, items).await
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        match self.fault {
            // Dropping the inner transaction discards its staged writes
            Fault::Commit => Err(injected()),
            Fault::CommitConflict => Err(RepositoryError::Conflict(
                "could not serialize access due to concurrent update".to_owned(),
            )),
            Fault::Decrement(_) => self.inner.commit().await,
        }
    }
}

async fn failing_context(
    fault_for: impl FnOnce(&Product) -> Fault,
) -> (TestContext<FailingStore>, Product, Product) {
    let memory = MemoryStore::new();
    let setup = TestContext::with_store(memory.clone(), &OrderConfig::default());
    let shop = setup.shop(&shopkeeper(10), "Tea House").await;
    let first = setup
        .product(&shop, "Sencha", "10.00", CurrencyCode::USD, 5)
        .await;
    let second = setup
        .product(&shop, "Kettle", "30.00", CurrencyCode::USD, 5)
        .await;

    let store = FailingStore {
        inner: memory,
        fault: fault_for(&second),
    };
    (
        TestContext::with_store(store, &OrderConfig::default()),
        first,
        second,
    )
}

#[tokio::test]
async fn test_decrement_failure_rolls_back_whole_order() {
    let (ctx, first, second) = failing_context(|p| Fault::Decrement(p.id)).await;

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&first, 2), line(&second, 1)], None)
        .await
        .unwrap_err();

    assert!(err.is_infrastructure());
    assert_eq!(ctx.stock(first.id).await, 5);
    assert_eq!(ctx.stock(second.id).await, 5);
    assert_eq!(ctx.store.inner.order_count().await, 0);
    assert_eq!(ctx.store.inner.order_item_count().await, 0);
}

#[tokio::test]
async fn test_commit_failure_leaves_no_order() {
    let (ctx, first, second) = failing_context(|_| Fault::Commit).await;

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&first, 1), line(&second, 1)], None)
        .await
        .unwrap_err();

    assert!(err.is_infrastructure());
    assert_eq!(ctx.stock(first.id).await, 5);
    assert_eq!(ctx.stock(second.id).await, 5);
    assert_eq!(ctx.store.inner.order_count().await, 0);

    // Row locks were released with the failed transaction
    let mut tx = ctx.store.inner.begin().await.unwrap();
    assert_eq!(tx.locked_get_product(first.id).await.unwrap().quantity, 5);
}

#[tokio::test]
async fn test_commit_conflict_is_infrastructure_failure() {
    let (ctx, first, second) = failing_context(|_| Fault::CommitConflict).await;

    let err = ctx
        .state
        .orders()
        .create_order(UserId::new(1), &[line(&first, 1), line(&second, 1)], None)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            ServiceError::Infrastructure(InfrastructureError::Repository(
                RepositoryError::Conflict(_)
            ))
        ),
        "{err:?}"
    );
    assert_eq!(ctx.stock(first.id).await, 5);
    assert_eq!(ctx.store.inner.order_count().await, 0);
}

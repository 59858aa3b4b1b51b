//! In-process store with the same transactional semantics as [`PgStore`].
//!
//! Committed state lives behind one async mutex and is only touched in short
//! critical sections. Row locks are per-product `tokio::sync::Mutex` guards
//! owned by the transaction that acquired them, so a second transaction
//! reading the same product waits until the first commits or is dropped.
//!
//! A transaction stages its decrements and order rows and applies them in
//! one step on commit; dropping it discards the staged writes and releases
//! the row locks, which is the rollback.
//!
//! Unlike `PostgreSQL` there is no deadlock detector: two transactions that
//! lock overlapping products in opposite order wait on each other until the
//! caller's timeout drops one of them.
//!
//! [`PgStore`]: super::PgStore

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use marketplace_core::{OrderId, OrderItemId, ProductId, ShopId, UserId};

use super::{
    Decrement, OrderStore, Page, ProductStore, RepositoryError, ShopStore, StoreTransaction,
};
use crate::models::{
    NewOrder, NewOrderItem, NewProduct, NewShop, Order, OrderItem, Product, ProductChanges, Shop,
    ShopChanges,
};

#[derive(Debug, Default)]
struct Tables {
    shops: BTreeMap<ShopId, Shop>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
}

#[derive(Debug, Default)]
struct Sequences {
    shop: AtomicI64,
    product: AtomicI64,
    order: AtomicI64,
    order_item: AtomicI64,
}

fn next(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    seq: Sequences,
}

/// In-memory store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed orders, including soft-deleted ones.
    pub async fn order_count(&self) -> usize {
        self.inner.tables.lock().await.orders.len()
    }

    /// Number of committed order items.
    pub async fn order_item_count(&self) -> usize {
        self.inner.tables.lock().await.items.len()
    }

    async fn lock_row(&self, id: ProductId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.row_locks.lock().await;
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let tables = self.inner.tables.lock().await;
        tables
            .products
            .get(&id)
            .filter(|p| p.is_live())
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        let mut tables = self.inner.tables.lock().await;
        if !tables.shops.contains_key(&input.shop_id) {
            return Err(RepositoryError::Conflict(format!(
                "shop {} does not exist",
                input.shop_id
            )));
        }
        if input.quantity < 0 {
            return Err(RepositoryError::Conflict(
                "quantity must not be negative".to_owned(),
            ));
        }

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(next(&self.inner.seq.product)),
            shop_id: input.shop_id,
            sku: input.sku.clone(),
            name: input.name.clone(),
            slug: input.slug.clone(),
            description: input.description.clone(),
            price: input.price,
            currency: input.currency,
            quantity: input.quantity,
            active: input.active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError> {
        let _row = self.lock_row(id).await;
        let mut tables = self.inner.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .filter(|p| p.is_live())
            .ok_or(RepositoryError::NotFound)?;

        if changes.quantity.is_some_and(|q| q < 0) {
            return Err(RepositoryError::Conflict(
                "quantity must not be negative".to_owned(),
            ));
        }
        if let Some(sku) = &changes.sku {
            product.sku = Some(sku.clone());
        }
        if let Some(name) = &changes.name {
            product.name.clone_from(name);
        }
        if let Some(slug) = &changes.slug {
            product.slug.clone_from(slug);
        }
        if let Some(description) = &changes.description {
            product.description = Some(description.clone());
        }
        if let Some(price) = changes.price {
            product.price = price;
        }
        if let Some(currency) = changes.currency {
            product.currency = currency;
        }
        if let Some(quantity) = changes.quantity {
            product.quantity = quantity;
        }
        if let Some(active) = changes.active {
            product.active = active;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn soft_delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let _row = self.lock_row(id).await;
        let mut tables = self.inner.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .filter(|p| p.is_live())
            .ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        product.deleted_at = Some(now);
        product.updated_at = now;
        Ok(())
    }

    async fn list_products_by_shop(
        &self,
        shop_id: ShopId,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.inner.tables.lock().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.shop_id == shop_id && p.is_live())
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window(products, page))
    }
}

#[async_trait]
impl ShopStore for MemoryStore {
    async fn get_shop(&self, id: ShopId) -> Result<Shop, RepositoryError> {
        let tables = self.inner.tables.lock().await;
        tables
            .shops
            .get(&id)
            .filter(|s| s.deleted_at.is_none())
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError> {
        let mut tables = self.inner.tables.lock().await;
        let now = Utc::now();
        let shop = Shop {
            id: ShopId::new(next(&self.inner.seq.shop)),
            owner_id: input.owner_id,
            name: input.name.clone(),
            slug: input.slug.clone(),
            description: input.description.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.shops.insert(shop.id, shop.clone());
        Ok(shop)
    }

    async fn update_shop(&self, id: ShopId, changes: &ShopChanges) -> Result<Shop, RepositoryError> {
        let mut tables = self.inner.tables.lock().await;
        let shop = tables
            .shops
            .get_mut(&id)
            .filter(|s| s.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;

        if let Some(name) = &changes.name {
            shop.name.clone_from(name);
        }
        if let Some(slug) = &changes.slug {
            shop.slug.clone_from(slug);
        }
        if let Some(description) = &changes.description {
            shop.description.clone_from(description);
        }
        shop.updated_at = Utc::now();
        Ok(shop.clone())
    }

    async fn soft_delete_shop(&self, id: ShopId) -> Result<(), RepositoryError> {
        let mut tables = self.inner.tables.lock().await;
        let shop = tables
            .shops
            .get_mut(&id)
            .filter(|s| s.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        shop.deleted_at = Some(now);
        shop.updated_at = now;
        Ok(())
    }

    async fn list_shops_by_owner(
        &self,
        owner_id: UserId,
        page: Page,
    ) -> Result<Vec<Shop>, RepositoryError> {
        let tables = self.inner.tables.lock().await;
        let mut shops: Vec<Shop> = tables
            .shops
            .values()
            .filter(|s| s.owner_id == owner_id && s.deleted_at.is_none())
            .cloned()
            .collect();
        shops.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window(shops, page))
    }
}

fn window<T>(rows: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl OrderStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError> {
        Ok(MemoryTransaction {
            store: self.clone(),
            row_guards: HashMap::new(),
            decrements: BTreeMap::new(),
            orders: Vec::new(),
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<(Order, Vec<OrderItem>), RepositoryError> {
        let tables = self.inner.tables.lock().await;
        let order = tables
            .orders
            .get(&id)
            .filter(|o| o.deleted_at.is_none())
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let mut items: Vec<OrderItem> = tables
            .items
            .iter()
            .filter(|item| item.order_id == id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok((order, items))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// An open in-memory transaction.
///
/// Holds the row locks it acquired and the writes it staged. Dropping it
/// without [`StoreTransaction::commit`] discards both.
pub struct MemoryTransaction {
    store: MemoryStore,
    row_guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    decrements: BTreeMap<ProductId, i32>,
    orders: Vec<(Order, Vec<OrderItem>)>,
}

impl std::fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("locked_rows", &self.row_guards.keys().collect::<Vec<_>>())
            .field("decrements", &self.decrements)
            .field("orders", &self.orders.len())
            .finish()
    }
}

impl MemoryTransaction {
    async fn ensure_locked(&mut self, id: ProductId) {
        if !self.row_guards.contains_key(&id) {
            let guard = self.store.lock_row(id).await;
            self.row_guards.insert(id, guard);
        }
    }

    fn staged_decrement(&self, id: ProductId) -> i32 {
        self.decrements.get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn locked_get_product(&mut self, id: ProductId) -> Result<Product, RepositoryError> {
        self.ensure_locked(id).await;
        let staged = self.staged_decrement(id);
        let tables = self.store.inner.tables.lock().await;
        let mut product = tables
            .products
            .get(&id)
            .filter(|p| p.is_live())
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        product.quantity -= staged;
        Ok(product)
    }

    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        amount: i32,
    ) -> Result<Decrement, RepositoryError> {
        self.ensure_locked(id).await;
        let staged = self.staged_decrement(id);
        let available = {
            let tables = self.store.inner.tables.lock().await;
            match tables.products.get(&id) {
                Some(product) => product.quantity - staged,
                None => return Ok(Decrement::Insufficient),
            }
        };

        if available < amount {
            return Ok(Decrement::Insufficient);
        }
        self.decrements.insert(id, staged + amount);
        Ok(Decrement::Applied)
    }

    async fn create_order_with_items(
        &mut self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<OrderId, RepositoryError> {
        {
            let tables = self.store.inner.tables.lock().await;
            if let Some(missing) = items
                .iter()
                .find(|item| !tables.products.contains_key(&item.product_id))
            {
                return Err(RepositoryError::Conflict(format!(
                    "product {} does not exist",
                    missing.product_id
                )));
            }
        }
        if let Some(bad) = items.iter().find(|item| item.quantity <= 0) {
            return Err(RepositoryError::Conflict(format!(
                "order item quantity must be positive (product {})",
                bad.product_id
            )));
        }

        let seq = &self.store.inner.seq;
        let now = Utc::now();
        let order_id = OrderId::new(next(&seq.order));
        let row = Order {
            id: order_id,
            buyer_id: order.buyer_id,
            total: order.total,
            currency: order.currency,
            status: order.status,
            note: order.note.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let item_rows = items
            .iter()
            .map(|item| OrderItem {
                id: OrderItemId::new(next(&seq.order_item)),
                order_id,
                product_id: item.product_id,
                name: item.name.clone(),
                sku: item.sku.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                total_price: item.total_price,
                created_at: now,
                updated_at: now,
            })
            .collect();

        self.orders.push((row, item_rows));
        Ok(order_id)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        let mut tables = self.store.inner.tables.lock().await;

        for (id, amount) in &self.decrements {
            let quantity = tables.products.get(id).map_or(0, |p| p.quantity);
            if quantity < *amount {
                return Err(RepositoryError::DataCorruption(format!(
                    "stock for product {id} changed underneath a locked row"
                )));
            }
        }

        let now = Utc::now();
        for (id, amount) in &self.decrements {
            if let Some(product) = tables.products.get_mut(id) {
                product.quantity -= amount;
                product.updated_at = now;
            }
        }
        for (order, items) in self.orders {
            tables.orders.insert(order.id, order);
            tables.items.extend(items);
        }
        Ok(())
    }
}

//! Order repository and transaction handle for `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};

use marketplace_core::{CurrencyCode, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::products::{PRODUCT_COLUMNS, ProductRow};
use super::{Decrement, OrderStore, PgStore, RepositoryError, StoreTransaction, translate_error};
use crate::models::{NewOrder, NewOrderItem, Order, OrderItem, Product};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    buyer_id: UserId,
    total: Decimal,
    currency: String,
    status: OrderStatus,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let currency = row.currency.parse::<CurrencyCode>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            buyer_id: row.buyer_id,
            total: row.total,
            currency,
            status: row.status,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    name: String,
    sku: Option<String>,
    unit_price: Decimal,
    quantity: i32,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            name: row.name,
            sku: row.sku,
            unit_price: row.unit_price,
            quantity: row.quantity,
            total_price: row.total_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl OrderStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError> {
        let tx = self.pool().begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn get_order(&self, id: OrderId) -> Result<(Order, Vec<OrderItem>), RepositoryError> {
        let order = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, buyer_id, total, currency, status, note,
                   created_at, updated_at, deleted_at
            FROM marketplace.orders
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let items = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, name, sku, unit_price, quantity,
                   total_price, created_at, updated_at
            FROM marketplace.order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok((
            order.try_into()?,
            items.into_iter().map(OrderItem::from).collect(),
        ))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}

/// An open `PostgreSQL` transaction.
///
/// Dropping it without calling [`StoreTransaction::commit`] rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn locked_get_product(&mut self, id: ProductId) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM marketplace.products \
             WHERE id = $1 AND deleted_at IS NULL \
             FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn conditional_decrement(
        &mut self,
        id: ProductId,
        amount: i32,
    ) -> Result<Decrement, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE marketplace.products
            SET quantity = quantity - $1, updated_at = now()
            WHERE id = $2 AND quantity >= $1
            ",
        )
        .bind(amount)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        Ok(if result.rows_affected() == 1 {
            Decrement::Applied
        } else {
            Decrement::Insufficient
        })
    }

    async fn create_order_with_items(
        &mut self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<OrderId, RepositoryError> {
        let order_id: OrderId = sqlx::query_scalar(
            r"
            INSERT INTO marketplace.orders (buyer_id, total, currency, status, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(order.buyer_id)
        .bind(order.total)
        .bind(order.currency.as_str())
        .bind(order.status)
        .bind(order.note.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(translate_error)?;

        for item in items {
            sqlx::query(
                r"
                INSERT INTO marketplace.order_items
                    (order_id, product_id, name, sku, unit_price, quantity, total_price)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.sku.as_deref())
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.total_price)
            .execute(&mut *self.tx)
            .await
            .map_err(translate_error)?;
        }

        Ok(order_id)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}

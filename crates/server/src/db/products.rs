//! Product repository for `PostgreSQL`.
//!
//! Rows are decoded into [`ProductRow`] and validated into [`Product`];
//! a currency the domain does not know is reported as data corruption.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use marketplace_core::{CurrencyCode, ProductId, ShopId};

use super::{Page, PgStore, ProductStore, RepositoryError, translate_error};
use crate::models::{NewProduct, Product, ProductChanges};

/// Columns selected for every product read.
pub(super) const PRODUCT_COLUMNS: &str = "id, shop_id, sku, name, slug, description, price, \
     currency, quantity, active, created_at, updated_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ProductRow {
    id: ProductId,
    shop_id: ShopId,
    sku: Option<String>,
    name: String,
    slug: String,
    description: Option<String>,
    price: Decimal,
    currency: String,
    quantity: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let currency = row.currency.parse::<CurrencyCode>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;
        if row.quantity < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "negative quantity {} for product {}",
                row.quantity, row.id
            )));
        }

        Ok(Self {
            id: row.id,
            shop_id: row.shop_id,
            sku: row.sku,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            currency,
            quantity: row.quantity,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM marketplace.products \
             WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO marketplace.products \
                 (shop_id, sku, name, slug, description, price, currency, quantity, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.shop_id)
        .bind(input.sku.as_deref())
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.currency.as_str())
        .bind(input.quantity)
        .bind(input.active)
        .fetch_one(self.pool())
        .await
        .map_err(translate_error)?;

        row.try_into()
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError> {
        // Only supplied columns are written so a concurrent stock decrement
        // is never overwritten with a stale quantity.
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE marketplace.products SET \
                 sku = COALESCE($2, sku), \
                 name = COALESCE($3, name), \
                 slug = COALESCE($4, slug), \
                 description = COALESCE($5, description), \
                 price = COALESCE($6, price), \
                 currency = COALESCE($7, currency), \
                 quantity = COALESCE($8, quantity), \
                 active = COALESCE($9, active), \
                 updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.sku.as_deref())
        .bind(changes.name.as_deref())
        .bind(changes.slug.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.price)
        .bind(changes.currency.map(|c| c.as_str()))
        .bind(changes.quantity)
        .bind(changes.active)
        .fetch_optional(self.pool())
        .await
        .map_err(translate_error)?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn soft_delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE marketplace.products SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_products_by_shop(
        &self,
        shop_id: ShopId,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM marketplace.products \
             WHERE shop_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(shop_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }
}

//! Product catalog.
//!
//! Reads go through the cache first and fall back to the store; writes go to
//! the store and then queue a cache population or invalidation. Updates and
//! deletes wait until their invalidation is queued, and a snapshot read
//! before an update is never cached after it (see [`crate::cache::CacheWriter`]).

use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use marketplace_core::{Price, ProductId, ShopId};

use super::access::ensure_can_modify;
use super::error::{Entity, NotFoundExt, ServiceError};
use super::slug::checked_slug;
use crate::cache::CacheLayer;
use crate::db::{Page, ProductStore, ShopStore};
use crate::models::{Actor, CreateProductInput, NewProduct, Product, ProductChanges};

/// Shortest accepted product name, in characters.
pub const MIN_PRODUCT_NAME_LENGTH: usize = 4;

/// Product CRUD with a read-aside cache.
#[derive(Debug, Clone)]
pub struct ProductService<S> {
    store: S,
    cache: CacheLayer,
}

impl<S: ProductStore + ShopStore> ProductService<S> {
    /// Create a new product service.
    #[must_use]
    pub const fn new(store: S, cache: CacheLayer) -> Self {
        Self { store, cache }
    }

    /// Create a product in a shop the actor may modify.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a bad price, quantity or name, `NotFound`
    /// if the shop does not exist and `PermissionDenied` if the actor does
    /// not own it.
    #[instrument(skip_all, fields(user_id = %actor.user_id, shop_id = %input.shop_id))]
    pub async fn create_product(
        &self,
        actor: &Actor,
        input: CreateProductInput,
    ) -> Result<Product, ServiceError> {
        if !input.shop_id.is_valid() {
            return Err(ServiceError::invalid("shop id must be positive"));
        }
        if !Price::new(input.price, input.currency).is_positive() {
            return Err(ServiceError::invalid("price must be greater than zero"));
        }
        if input.quantity < 0 {
            return Err(ServiceError::invalid("quantity must not be negative"));
        }
        let name = validate_name(&input.name)?;
        let slug = checked_slug(&name)?;

        let shop = self
            .store
            .get_shop(input.shop_id)
            .await
            .or_not_found(Entity::Shop, input.shop_id)?;
        ensure_can_modify(actor, &shop)?;

        let product = self
            .store
            .create_product(&NewProduct {
                shop_id: shop.id,
                sku: input.sku,
                name,
                slug,
                description: input.description,
                price: input.price,
                currency: input.currency,
                quantity: input.quantity,
                active: input.active,
            })
            .await?;

        self.cache.writer().populate(&product);
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Read a product, serving it from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive id and `NotFound` if the
    /// product does not exist.
    #[instrument(skip_all, fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ServiceError> {
        if !id.is_valid() {
            return Err(ServiceError::invalid("product id must be positive"));
        }

        if let Some(product) = self.cache.get(id).await {
            debug!("cache hit");
            return Ok(product);
        }
        debug!("cache miss");

        let product = self
            .store
            .get_product(id)
            .await
            .or_not_found(Entity::Product, id)?;
        self.cache.writer().populate(&product);
        Ok(product)
    }

    /// Apply a partial update to a product the actor may modify.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product or its shop does not exist,
    /// `PermissionDenied` if the actor does not own the shop and
    /// `InvalidInput` for an empty or invalid change set.
    #[instrument(skip_all, fields(user_id = %actor.user_id, product_id = %id))]
    pub async fn update_product(
        &self,
        actor: &Actor,
        id: ProductId,
        mut changes: ProductChanges,
    ) -> Result<Product, ServiceError> {
        if !id.is_valid() {
            return Err(ServiceError::invalid("product id must be positive"));
        }
        self.authorize(actor, id).await?;

        if changes.is_empty() {
            return Err(ServiceError::invalid("no fields to update"));
        }
        if let Some(name) = changes.name.take() {
            let name = validate_name(&name)?;
            changes.slug = Some(checked_slug(&name)?);
            changes.name = Some(name);
        }
        if changes.price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(ServiceError::invalid("price must be greater than zero"));
        }
        if changes.quantity.is_some_and(|q| q < 0) {
            return Err(ServiceError::invalid("quantity must not be negative"));
        }

        let product = self
            .store
            .update_product(id, &changes)
            .await
            .or_not_found(Entity::Product, id)?;

        self.cache.writer().invalidate(&product).await;
        info!("product updated");
        Ok(product)
    }

    /// Soft-delete a product the actor may modify.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product or its shop does not exist and
    /// `PermissionDenied` if the actor does not own the shop.
    #[instrument(skip_all, fields(user_id = %actor.user_id, product_id = %id))]
    pub async fn delete_product(&self, actor: &Actor, id: ProductId) -> Result<(), ServiceError> {
        if !id.is_valid() {
            return Err(ServiceError::invalid("product id must be positive"));
        }
        self.authorize(actor, id).await?;

        self.store
            .soft_delete_product(id)
            .await
            .or_not_found(Entity::Product, id)?;

        self.cache.writer().invalidate_deleted(id).await;
        info!("product deleted");
        Ok(())
    }

    /// Live products of a shop, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive shop id.
    #[instrument(skip_all, fields(shop_id = %shop_id))]
    pub async fn list_products(
        &self,
        shop_id: ShopId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, ServiceError> {
        if !shop_id.is_valid() {
            return Err(ServiceError::invalid("shop id must be positive"));
        }
        let products = self
            .store
            .list_products_by_shop(shop_id, Page::clamped(limit, offset))
            .await?;
        debug!(count = products.len(), "products listed");
        Ok(products)
    }

    /// Load the product and its shop from the store and check ownership.
    async fn authorize(&self, actor: &Actor, id: ProductId) -> Result<(), ServiceError> {
        let product = self
            .store
            .get_product(id)
            .await
            .or_not_found(Entity::Product, id)?;
        let shop = self
            .store
            .get_shop(product.shop_id)
            .await
            .or_not_found(Entity::Shop, product.shop_id)?;
        ensure_can_modify(actor, &shop)
    }
}

fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.chars().count() < MIN_PRODUCT_NAME_LENGTH {
        return Err(ServiceError::invalid(format!(
            "product name must be at least {MIN_PRODUCT_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed_before_length_check() {
        assert!(validate_name("  tea  ").is_err());
        assert_eq!(validate_name("  Matcha ").ok().as_deref(), Some("Matcha"));
    }
}

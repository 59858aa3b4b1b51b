//! Shop management.

use tracing::{debug, info, instrument};

use marketplace_core::{ShopId, UserId};

use super::access::ensure_can_modify;
use super::error::{Entity, NotFoundExt, ServiceError};
use super::slug::checked_slug;
use crate::db::{Page, ShopStore};
use crate::models::{Actor, CreateShopInput, NewShop, Shop, ShopChanges};

/// Shortest accepted shop name, in characters.
pub const MIN_SHOP_NAME_LENGTH: usize = 3;

/// Shop CRUD. Shops are not cached.
#[derive(Debug, Clone)]
pub struct ShopService<S> {
    store: S,
}

impl<S: ShopStore> ShopService<S> {
    /// Create a new shop service.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a shop owned by `actor`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is too short or has no letters or
    /// digits to build a slug from.
    #[instrument(skip_all, fields(user_id = %actor.user_id))]
    pub async fn create_shop(
        &self,
        actor: &Actor,
        input: CreateShopInput,
    ) -> Result<Shop, ServiceError> {
        let name = validate_name(&input.name)?;
        let slug = checked_slug(&name)?;

        let shop = self
            .store
            .create_shop(&NewShop {
                owner_id: actor.user_id,
                name,
                slug,
                description: input.description,
            })
            .await?;

        info!(shop_id = %shop.id, "shop created");
        Ok(shop)
    }

    /// Read a live shop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive id and `NotFound` if the
    /// shop does not exist.
    pub async fn get_shop(&self, id: ShopId) -> Result<Shop, ServiceError> {
        if !id.is_valid() {
            return Err(ServiceError::invalid("shop id must be positive"));
        }
        self.store.get_shop(id).await.or_not_found(Entity::Shop, id)
    }

    /// Update a shop the actor may modify.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PermissionDenied` or `InvalidInput`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, shop_id = %id))]
    pub async fn update_shop(
        &self,
        actor: &Actor,
        id: ShopId,
        mut changes: ShopChanges,
    ) -> Result<Shop, ServiceError> {
        let shop = self.get_shop(id).await?;
        ensure_can_modify(actor, &shop)?;

        if changes.name.is_none() && changes.description.is_none() {
            return Err(ServiceError::invalid("no fields to update"));
        }
        if let Some(name) = changes.name.take() {
            let name = validate_name(&name)?;
            changes.slug = Some(checked_slug(&name)?);
            changes.name = Some(name);
        }

        let shop = self
            .store
            .update_shop(id, &changes)
            .await
            .or_not_found(Entity::Shop, id)?;
        info!("shop updated");
        Ok(shop)
    }

    /// Soft-delete a shop the actor may modify.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `PermissionDenied`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, shop_id = %id))]
    pub async fn delete_shop(&self, actor: &Actor, id: ShopId) -> Result<(), ServiceError> {
        let shop = self.get_shop(id).await?;
        ensure_can_modify(actor, &shop)?;

        self.store
            .soft_delete_shop(id)
            .await
            .or_not_found(Entity::Shop, id)?;
        info!("shop deleted");
        Ok(())
    }

    /// Live shops of an owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive owner id.
    #[instrument(skip_all, fields(owner_id = %owner_id))]
    pub async fn list_shops(
        &self,
        owner_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Shop>, ServiceError> {
        if !owner_id.is_valid() {
            return Err(ServiceError::invalid("owner id must be positive"));
        }
        let shops = self
            .store
            .list_shops_by_owner(owner_id, Page::clamped(limit, offset))
            .await?;
        debug!(count = shops.len(), "shops listed");
        Ok(shops)
    }
}

fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.chars().count() < MIN_SHOP_NAME_LENGTH {
        return Err(ServiceError::invalid(format!(
            "shop name must be at least {MIN_SHOP_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

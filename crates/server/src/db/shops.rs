//! Shop repository for `PostgreSQL`.

use async_trait::async_trait;

use marketplace_core::{ShopId, UserId};

use super::{Page, PgStore, RepositoryError, ShopStore, translate_error};
use crate::models::{NewShop, Shop, ShopChanges};

#[derive(Debug, sqlx::FromRow)]
struct ShopRow {
    id: ShopId,
    owner_id: UserId,
    name: String,
    slug: String,
    description: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ShopStore for PgStore {
    async fn get_shop(&self, id: ShopId) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            SELECT id, owner_id, name, slug, description, created_at, updated_at, deleted_at
            FROM marketplace.shops
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn create_shop(&self, input: &NewShop) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            INSERT INTO marketplace.shops (owner_id, name, slug, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id, owner_id, name, slug, description, created_at, updated_at, deleted_at
            ",
        )
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .fetch_one(self.pool())
        .await
        .map_err(translate_error)?;

        Ok(row.into())
    }

    async fn update_shop(&self, id: ShopId, changes: &ShopChanges) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(
            r"
            UPDATE marketplace.shops SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, owner_id, name, slug, description, created_at, updated_at, deleted_at
            ",
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.slug.as_deref())
        .bind(changes.description.as_deref())
        .fetch_optional(self.pool())
        .await
        .map_err(translate_error)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn soft_delete_shop(&self, id: ShopId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE marketplace.shops SET deleted_at = now(), updated_at = now() \
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

    async fn list_shops_by_owner(
        &self,
        owner_id: UserId,
        page: Page,
    ) -> Result<Vec<Shop>, RepositoryError> {
        let rows = sqlx::query_as::<_, ShopRow>(
            r"
            SELECT id, owner_id, name, slug, description, created_at, updated_at, deleted_at
            FROM marketplace.shops
            WHERE owner_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(owner_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Shop::from).collect())
    }
}

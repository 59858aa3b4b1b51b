//! Shop domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketplace_core::{ShopId, UserId};

/// A shop owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    /// Unique shop ID.
    pub id: ShopId,
    /// Owner. Never changes after creation.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// URL slug derived from the name.
    pub slug: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// When the shop was created.
    pub created_at: DateTime<Utc>,
    /// When the shop was last updated.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; `None` while the shop is live.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Request body for creating a shop. The owner is the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateShopInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A validated shop ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewShop {
    pub owner_id: UserId,
    pub name: String,
    pub slug: String,
    pub description: String,
}

/// Partial shop update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShopChanges {
    #[serde(default)]
    pub name: Option<String>,
    /// Derived from `name`, never taken from input.
    #[serde(skip_deserializing)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

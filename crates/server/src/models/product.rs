//! Product domain types.
//!
//! [`Product`] is also the cached representation: it is serialized to JSON
//! under `product:<id>`. Fields added later must carry a serde default so
//! entries written by an older build still deserialize.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketplace_core::{CurrencyCode, Price, ProductId, ShopId};

const fn default_active() -> bool {
    true
}

/// A product listed by a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Shop that owns this product.
    pub shop_id: ShopId,
    /// Merchant stock-keeping unit.
    #[serde(default)]
    pub sku: Option<String>,
    /// Display name.
    pub name: String,
    /// URL slug derived from the name.
    pub slug: String,
    /// Long description.
    #[serde(default)]
    pub description: Option<String>,
    /// Unit price in `currency`.
    pub price: Decimal,
    /// Currency of `price`.
    pub currency: CurrencyCode,
    /// Units available for sale. Never negative.
    pub quantity: i32,
    /// Whether the product is listed.
    #[serde(default = "default_active")]
    pub active: bool,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; `None` while the product is live.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Unit price with its currency.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        Price::new(self.price, self.currency)
    }

    /// Returns `true` if the product has not been soft-deleted.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Request body for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub shop_id: ShopId,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// A validated product ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub shop_id: ShopId,
    pub sku: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub quantity: i32,
    pub active: bool,
}

/// Partial product update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductChanges {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Derived from `name` by the catalog service, never taken from input.
    #[serde(skip_deserializing)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl ProductChanges {
    /// Returns `true` if no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sku.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.currency.is_none()
            && self.quantity.is_none()
            && self.active.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_entry_without_optional_fields_deserializes() {
        // Shape written before `sku`, `description`, `active` and
        // `deleted_at` were part of the cached snapshot.
        let json = r#"{
            "id": 3,
            "shop_id": 1,
            "name": "Green tea",
            "slug": "green-tea",
            "price": "4.50",
            "currency": "EUR",
            "quantity": 12,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }"#;

        let product: Product = serde_json::from_str(json).expect("deserialize");
        assert_eq!(product.id, ProductId::new(3));
        assert_eq!(product.price, Decimal::new(450, 2));
        assert!(product.active);
        assert!(product.is_live());
        assert!(product.sku.is_none());
    }

    #[test]
    fn test_changes_ignore_slug_from_input() {
        let changes: ProductChanges =
            serde_json::from_str(r#"{"name": "Black tea", "slug": "hacked"}"#).expect("parse");
        assert_eq!(changes.name.as_deref(), Some("Black tea"));
        assert!(changes.slug.is_none());
        assert!(!changes.is_empty());
        assert!(ProductChanges::default().is_empty());
    }
}

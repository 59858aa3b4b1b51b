//! Seed shops and products from a YAML file.
//!
//! ```yaml
//! shops:
//!   - owner_id: 7
//!     name: Leaf & Kettle
//!     description: Loose leaf tea
//!     products:
//!       - name: Sencha
//!         sku: TEA-001
//!         price: "12.50"
//!         currency: USD
//!         quantity: 40
//! ```
//!
//! Rows are created through the shop and product services, so the usual
//! validation and slug rules apply.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use marketplace_core::{CurrencyCode, Role, UserId};
use marketplace_server::cache::{CacheLayer, CacheWriter, InProcessCache};
use marketplace_server::config::DatabaseConfig;
use marketplace_server::db::{self, PgStore, Store};
use marketplace_server::models::{Actor, CreateProductInput, CreateShopInput};
use marketplace_server::services::{ProductService, ShopService};

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub shops: Vec<SeedShop>,
}

#[derive(Debug, Deserialize)]
pub struct SeedShop {
    pub owner_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub quantity: i32,
}

/// Counts of rows created by a seed run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub shops: usize,
    pub products: usize,
}

/// Seed the database from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the database URL is
/// missing, or a shop or product is rejected.
pub async fn from_file(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    // Parse before connecting so a bad file fails fast
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;
    info!(shops = seed.shops.len(), "Parsed seed file");

    let database_url = super::database_url()?;
    let pool = db::create_pool(&database_url, &DatabaseConfig::default()).await?;

    let summary = apply(PgStore::new(pool), seed).await?;
    info!(
        shops = summary.shops,
        products = summary.products,
        "Seeding complete"
    );
    Ok(())
}

/// Create every shop and product in `seed`.
pub async fn apply<S: Store>(
    store: S,
    seed: SeedFile,
) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    // Seeding never reads products back; a small local cache keeps the
    // service happy.
    let backend = Arc::new(InProcessCache::new(16));
    let (writer, _worker) = CacheWriter::spawn(backend.clone(), Duration::from_secs(60), 16);
    let shops = ShopService::new(store.clone());
    let products = ProductService::new(store, CacheLayer::new(backend, writer));

    let mut summary = SeedSummary::default();
    for entry in seed.shops {
        let owner = Actor::new(UserId::new(entry.owner_id), Role::Shopkeeper);
        let shop = shops
            .create_shop(
                &owner,
                CreateShopInput {
                    name: entry.name,
                    description: entry.description,
                },
            )
            .await?;
        summary.shops += 1;

        for product in entry.products {
            products
                .create_product(
                    &owner,
                    CreateProductInput {
                        shop_id: shop.id,
                        sku: product.sku,
                        name: product.name,
                        description: product.description,
                        price: product.price,
                        currency: product.currency,
                        quantity: product.quantity,
                        active: true,
                    },
                )
                .await?;
            summary.products += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_server::db::MemoryStore;

    use super::*;

    const SEED: &str = r#"
shops:
  - owner_id: 7
    name: Leaf & Kettle
    description: Loose leaf tea
    products:
      - name: Sencha
        sku: TEA-001
        price: "12.50"
        currency: USD
        quantity: 40
      - name: Genmaicha
        price: "9.00"
        currency: USD
        quantity: 12
  - owner_id: 8
    name: Mug Works
"#;

    #[tokio::test]
    async fn test_apply_seed_file() {
        let seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        let summary = apply(MemoryStore::new(), seed).await.unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                shops: 2,
                products: 2
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected() {
        let seed: SeedFile = serde_yaml::from_str(
            r#"
shops:
  - owner_id: 1
    name: Bad Prices
    products:
      - name: Free Thing
        price: "0"
        currency: USD
        quantity: 1
"#,
        )
        .unwrap();
        assert!(apply(MemoryStore::new(), seed).await.is_err());
    }
}

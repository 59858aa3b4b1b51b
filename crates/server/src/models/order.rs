//! Order domain types.
//!
//! An [`Order`] exclusively owns its [`OrderItem`]s. Items snapshot the
//! product name, SKU and unit price at purchase time so later product edits
//! never change a historical order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketplace_core::{CurrencyCode, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Buyer who placed the order.
    pub buyer_id: UserId,
    /// Sum of all line totals.
    pub total: Decimal,
    /// Single currency shared by every line.
    pub currency: CurrencyCode,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One line of a committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Product name at purchase time.
    pub name: String,
    /// Product SKU at purchase time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Unit price at purchase time.
    pub unit_price: Decimal,
    /// Units purchased. Always positive.
    pub quantity: i32,
    /// `unit_price * quantity`.
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order together with its items, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// A requested `(product, quantity)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Request body for placing an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderInput {
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Order header computed by the placement engine, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: UserId,
    pub total: Decimal,
    pub currency: CurrencyCode,
    pub status: OrderStatus,
    pub note: Option<String>,
}

/// Order line snapshot computed by the placement engine, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
}

//! Domain models for the marketplace.
//!
//! These types represent validated domain objects, separate from the
//! database row types in [`crate::db`].

pub mod actor;
pub mod order;
pub mod product;
pub mod shop;

pub use actor::Actor;
pub use order::{
    CreateOrderInput, NewOrder, NewOrderItem, Order, OrderItem, OrderLine, OrderWithItems,
};
pub use product::{CreateProductInput, NewProduct, Product, ProductChanges};
pub use shop::{CreateShopInput, NewShop, Shop, ShopChanges};

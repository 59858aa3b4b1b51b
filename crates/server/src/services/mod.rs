//! Business logic for the marketplace.
//!
//! # Services
//!
//! - [`OrderService`] - transactional order placement and order reads
//! - [`ProductService`] - product catalog with a read-aside cache
//! - [`ShopService`] - shop management
//!
//! Services are generic over the store traits in [`crate::db`], so the same
//! code runs against `PostgreSQL` and the in-memory store.

pub mod access;
mod error;
pub mod orders;
pub mod products;
pub mod shops;
pub mod slug;

pub use error::{Entity, InfrastructureError, NotFoundExt, ServiceError};
pub use orders::OrderService;
pub use products::ProductService;
pub use shops::ShopService;

//! Marketplace Core - Shared domain types.
//!
//! This crate provides the value types used across the marketplace crates:
//! - `server` - Order placement engine, catalog services and HTTP layer
//! - `cli` - Command-line tools for migrations
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no
//! caches. Storage traits live next to their implementations in the server
//! crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, statuses and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

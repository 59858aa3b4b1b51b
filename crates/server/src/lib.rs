//! Marketplace back end.
//!
//! Order placement with all-or-nothing stock decrements, a shop and product
//! catalog, and a read-through product cache, served over a JSON HTTP API.
//! Built as a library so the binary, the CLI and the integration tests share
//! one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

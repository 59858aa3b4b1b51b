//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors, added in `main`)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//!
//! Authentication happens upstream; [`RequireActor`] reads the identity the
//! gateway forwards.

pub mod auth;
pub mod request_id;

pub use auth::{RequireActor, USER_ID_HEADER, USER_ROLE_HEADER};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};

//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                         - Liveness
//! GET    /health/ready                   - Store connectivity
//!
//! # Orders (authenticated)
//! POST   /api/v1/orders                  - Place an order
//! GET    /api/v1/orders/{id}             - Order with items (buyer or admin)
//!
//! # Products
//! POST   /api/v1/products                - Create (shop owner or admin)
//! GET    /api/v1/products/{id}           - Read (cached)
//! PUT    /api/v1/products/{id}           - Partial update (shop owner or admin)
//! DELETE /api/v1/products/{id}           - Soft delete (shop owner or admin)
//!
//! # Shops
//! GET    /api/v1/shops?owner_id=         - Owner's live shops, newest first
//! POST   /api/v1/shops                   - Create (caller becomes owner)
//! GET    /api/v1/shops/{id}              - Read
//! PUT    /api/v1/shops/{id}              - Update (owner or admin)
//! DELETE /api/v1/shops/{id}              - Soft delete (owner or admin)
//! GET    /api/v1/shops/{id}/products     - Live products, newest first
//! ```

pub mod orders;
pub mod products;
pub mod shops;

use axum::{
    Router,
    extract::{FromRequest, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::db::Store;
use crate::error::AppError;
use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// JSON body extractor whose rejections render as [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Create the order routes router.
pub fn order_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", post(orders::create::<S>))
        .route("/{id}", get(orders::show::<S>))
}

/// Create the product routes router.
pub fn product_routes<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/", post(products::create::<S>)).route(
        "/{id}",
        get(products::show::<S>)
            .put(products::update::<S>)
            .delete(products::delete::<S>),
    )
}

/// Create the shop routes router.
pub fn shop_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(shops::list::<S>).post(shops::create::<S>))
        .route(
            "/{id}",
            get(shops::show::<S>)
                .put(shops::update::<S>)
                .delete(shops::delete::<S>),
        )
        .route("/{id}/products", get(products::list_by_shop::<S>))
}

/// Create all API routes.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .nest("/api/v1/orders", order_routes())
        .nest("/api/v1/products", product_routes())
        .nest("/api/v1/shops", shop_routes())
}

/// Build the full application router with health checks, tracing and
/// request IDs. Sentry layers are added by the binary.
pub fn app<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness::<S>))
        .merge(routes())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness<S: Store>(State(state): State<AppState<S>>) -> StatusCode {
    match state.orders().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

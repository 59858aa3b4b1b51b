//! Product route handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use marketplace_core::{ProductId, ShopId};

use super::ApiJson;
use crate::db::Store;
use crate::error::Result;
use crate::middleware::RequireActor;
use crate::models::{CreateProductInput, ProductChanges};
use crate::state::AppState;

/// Pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// `POST /api/v1/products`
pub async fn create<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    ApiJson(input): ApiJson<CreateProductInput>,
) -> Result<impl IntoResponse> {
    let product = state.products().create_product(&actor, input).await?;
    Ok((StatusCode::CREATED, axum::Json(product)))
}

/// `GET /api/v1/products/{id}`
pub async fn show<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let product = state.products().get_product(ProductId::new(id)).await?;
    Ok(axum::Json(product))
}

/// `PUT /api/v1/products/{id}`
pub async fn update<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    Path(id): Path<i64>,
    ApiJson(changes): ApiJson<ProductChanges>,
) -> Result<impl IntoResponse> {
    let product = state
        .products()
        .update_product(&actor, ProductId::new(id), changes)
        .await?;
    Ok(axum::Json(product))
}

/// `DELETE /api/v1/products/{id}`
pub async fn delete<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state
        .products()
        .delete_product(&actor, ProductId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/shops/{id}/products?limit&offset`
pub async fn list_by_shop<S: Store>(
    State(state): State<AppState<S>>,
    Path(shop_id): Path<i64>,
    Query(page): Query<PaginationQuery>,
) -> Result<impl IntoResponse> {
    let products = state
        .products()
        .list_products(ShopId::new(shop_id), page.limit, page.offset)
        .await?;
    Ok(axum::Json(products))
}

//! Shop route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use marketplace_core::{ShopId, UserId};

use super::ApiJson;
use crate::db::Store;
use crate::error::Result;
use crate::middleware::RequireActor;
use crate::models::{CreateShopInput, ShopChanges};
use crate::state::AppState;

/// Query string of `GET /api/v1/shops`.
#[derive(Debug, Default, Deserialize)]
pub struct ShopListQuery {
    /// A missing owner reaches the service as `0` and is rejected there.
    #[serde(default)]
    pub owner_id: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// `GET /api/v1/shops?owner_id=&limit=&offset=`
pub async fn list<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<ShopListQuery>,
) -> Result<impl IntoResponse> {
    let shops = state
        .shops()
        .list_shops(UserId::new(query.owner_id), query.limit, query.offset)
        .await?;
    Ok(Json(shops))
}

/// `POST /api/v1/shops`
pub async fn create<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    ApiJson(input): ApiJson<CreateShopInput>,
) -> Result<impl IntoResponse> {
    let shop = state.shops().create_shop(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(shop)))
}

/// `GET /api/v1/shops/{id}`
pub async fn show<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.shops().get_shop(ShopId::new(id)).await?))
}

/// `PUT /api/v1/shops/{id}`
pub async fn update<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    Path(id): Path<i64>,
    ApiJson(changes): ApiJson<ShopChanges>,
) -> Result<impl IntoResponse> {
    let shop = state
        .shops()
        .update_shop(&actor, ShopId::new(id), changes)
        .await?;
    Ok(Json(shop))
}

/// `DELETE /api/v1/shops/{id}`
pub async fn delete<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.shops().delete_shop(&actor, ShopId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use marketplace_core::OrderId;

use super::ApiJson;
use crate::db::Store;
use crate::error::Result;
use crate::middleware::RequireActor;
use crate::models::CreateOrderInput;
use crate::state::AppState;

/// Body returned after an order is placed.
#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
}

/// `POST /api/v1/orders`
///
/// The caller is the buyer.
pub async fn create<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    ApiJson(input): ApiJson<CreateOrderInput>,
) -> Result<impl IntoResponse> {
    let order_id = state
        .orders()
        .create_order(actor.user_id, &input.items, input.note)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderCreated { order_id })))
}

/// `GET /api/v1/orders/{id}`
///
/// Only the buyer or an admin may read an order.
pub async fn show<S: Store>(
    State(state): State<AppState<S>>,
    RequireActor(actor): RequireActor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let order = state
        .orders()
        .get_order_for(&actor, OrderId::new(id))
        .await?;
    Ok(Json(order))
}

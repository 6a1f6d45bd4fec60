//! Order API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use validator::Validate;

use shared::order::{OrderStatus, Role};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::models::{CreateOrderRequest, OrderDto, UpdateOrderStatusRequest};
use crate::utils::{AppError, AppResult};

/// Query params for listing orders
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<OrderStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Place a new order
pub async fn create(
    State(state): State<ServerState>,
    user: CurrentUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<Json<OrderDto>> {
    if user.role != Role::Buyer {
        return Err(AppError::forbidden("Only buyers can place orders"));
    }
    payload.validate()?;

    let order = state
        .order_service()
        .create_order(payload, &user.id)
        .await?;
    Ok(Json(order))
}

/// Orders placed by the current buyer
pub async fn list_my(
    State(state): State<ServerState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<OrderDto>>> {
    if user.role != Role::Buyer {
        return Err(AppError::forbidden("Only buyers have a purchase history"));
    }

    let orders = state
        .order_service()
        .list_for_buyer(&user.id, query.status, query.limit, query.offset)
        .await?;
    Ok(Json(orders))
}

/// Orders containing the current seller's items
pub async fn list_selling(
    State(state): State<ServerState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<OrderDto>>> {
    if user.role != Role::Seller {
        return Err(AppError::forbidden("Only sellers have a sales history"));
    }

    let orders = state
        .order_service()
        .list_for_seller(&user.id, query.status, query.limit, query.offset)
        .await?;
    Ok(Json(orders))
}

/// Get order by id (visibility enforced by role)
pub async fn get_by_id(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<OrderDto>> {
    let order = state.order_service().get_order(&id, &user.actor()).await?;
    Ok(Json(order))
}

/// Request a status transition
pub async fn update_status(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<OrderDto>> {
    let order = state
        .order_service()
        .update_status(&id, payload.status, &user.actor(), payload.tracking_number)
        .await?;
    Ok(Json(order))
}

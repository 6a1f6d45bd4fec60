//! Order API Module
//!
//! 下单、查询与状态流转。身份来自上游注入的 [`crate::auth::CurrentUser`]；
//! 角色权限由状态机的权限表在服务层强制执行。

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Place a new order (buyer)
        .route("/", post(handler::create))
        // Own orders (buyer)
        .route("/my", get(handler::list_my))
        // Orders containing the seller's items
        .route("/selling", get(handler::list_selling))
        // Order detail (visibility enforced by role)
        .route("/{id}", get(handler::get_by_id))
        // Status transition
        .route("/{id}/status", put(handler::update_status))
}

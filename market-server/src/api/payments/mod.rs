//! Payment API Module
//!
//! `/notify` 是唯一不带身份的入口：网关直接回调，信任由对账器的
//! 多级验证管道建立。`/return` 和 `/cancel` 仅作落地页，不改状态。

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Payment router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/payments", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Build the signed gateway redirect (buyer)
        .route("/initiate", post(handler::initiate))
        // Gateway webhook (unauthenticated)
        .route("/notify", post(handler::notify))
        // Informational redirect landings (no state mutation)
        .route("/return", get(handler::payment_return))
        .route("/cancel", get(handler::payment_cancel))
}

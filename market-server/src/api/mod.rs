//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`orders`] - 下单、订单查询、状态流转
//! - [`payments`] - 发起支付、网关回调

pub mod health;
pub mod middleware;
pub mod orders;
pub mod payments;

use axum::Router;
use axum::middleware as axum_middleware;
use http::{HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).unwrap()))
    }
}

/// Build a router with all routes registered (no middleware, no state)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        // Order API - identity headers required
        .merge(orders::router())
        // Payment API - webhook route is unauthenticated by design
        .merge(payments::router())
        // Health API - public route
        .merge(health::router())
}

/// Build a fully configured application with all middleware
pub fn build_app() -> Router<ServerState> {
    build_router().layer(
        ServiceBuilder::new()
            // Request ID - Generate unique ID for each request
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static("x-request-id"),
                XRequestId,
            ))
            // Propagate request ID to response
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            // Request logging - before tracing so latency covers everything
            .layer(axum_middleware::from_fn(middleware::logging_middleware))
            // Trace - Request tracing (logs at INFO level)
            .layer(TraceLayer::new_for_http())
            // CORS - Handle cross-origin requests
            .layer(CorsLayer::permissive())
            // Compression - Gzip compress responses
            .layer(CompressionLayer::new()),
    )
}

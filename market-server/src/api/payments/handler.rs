//! Payment API Handlers

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Form, Query, State},
    http::{HeaderMap, StatusCode},
};
use validator::Validate;

use shared::order::Role;
use shared::payment::PaymentNotification;

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::models::{PaymentRequest, PaymentResponse};
use crate::utils::{AppError, AppResponse, AppResult, ok_with_message};

/// Build the signed gateway redirect for an order
pub async fn initiate(
    State(state): State<ServerState>,
    user: CurrentUser,
    Json(payload): Json<PaymentRequest>,
) -> AppResult<Json<PaymentResponse>> {
    if user.role != Role::Buyer {
        return Err(AppError::forbidden("Only buyers can initiate payments"));
    }
    payload.validate()?;

    let response = state.payment_service().initiate(payload, &user.id).await?;
    Ok(Json(response))
}

/// Gateway webhook: unauthenticated, trust established by the
/// reconciler's pipeline. The acknowledgment status code is the single
/// signal driving the gateway's retry behaviour.
pub async fn notify(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(notification): Form<PaymentNotification>,
) -> StatusCode {
    let peer_ip = client_ip(&headers, peer);

    let outcome = state.reconciler().process(&notification, &peer_ip).await;
    if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Buyer lands here after a successful gateway flow. Informational only:
/// the order status changes exclusively through the webhook.
pub async fn payment_return(
    Query(params): Query<HashMap<String, String>>,
) -> Json<AppResponse<()>> {
    tracing::info!(
        order_id = params.get("m_payment_id").map(|s| s.as_str()).unwrap_or("-"),
        "buyer returned from gateway"
    );
    ok_with_message((), "Payment is being processed")
}

/// Buyer lands here after cancelling at the gateway. No state mutation.
pub async fn payment_cancel(
    Query(params): Query<HashMap<String, String>>,
) -> Json<AppResponse<()>> {
    tracing::info!(
        order_id = params.get("m_payment_id").map(|s| s.as_str()).unwrap_or("-"),
        "buyer cancelled at gateway"
    );
    ok_with_message((), "Payment was cancelled")
}

/// Resolve the caller IP: first hop of x-forwarded-for when running
/// behind a proxy, otherwise the socket peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty() && !ip.eq_ignore_ascii_case("unknown"))
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "203.0.113.7:44210".parse().unwrap()
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "196.33.227.224, 10.0.0.2".parse().unwrap(),
        );
        assert_eq!(client_ip(&headers, addr()), "196.33.227.224");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), addr()), "203.0.113.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "unknown".parse().unwrap());
        assert_eq!(client_ip(&headers, addr()), "203.0.113.7");
    }
}

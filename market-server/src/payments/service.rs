//! Payment Initiation
//!
//! Builds the signed redirect that sends a buyer to the gateway. This
//! never mutates order status — status only changes when the reconciler
//! has verified the gateway's notification.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use shared::order::OrderStatus;

use crate::core::Config;
use crate::db::models::{PaymentRequest, PaymentResponse};
use crate::db::repository::{OrderRepository, RepoError, UserRepository};
use crate::orders::money;
use crate::payments::gateway::GatewayClient;
use crate::payments::signature;
use crate::utils::AppError;

/// Payment initiation errors
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order does not belong to the current user")]
    NotOrderOwner,

    #[error("order is not awaiting payment (status: {0})")]
    NotPayable(OrderStatus),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for PaymentError {
    fn from(e: RepoError) -> Self {
        PaymentError::Storage(e.to_string())
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match &e {
            PaymentError::OrderNotFound(_) => AppError::not_found(e.to_string()),
            PaymentError::NotOrderOwner => AppError::forbidden(e.to_string()),
            PaymentError::NotPayable(_) => AppError::business_rule(e.to_string()),
            PaymentError::Storage(_) => AppError::database(e.to_string()),
            PaymentError::Internal(_) => AppError::internal(e.to_string()),
        }
    }
}

/// Payment initiation service
pub struct PaymentService {
    orders: OrderRepository,
    users: UserRepository,
    gateway: Arc<GatewayClient>,
    base_url: String,
}

impl PaymentService {
    pub fn new(
        db: surrealdb::Surreal<surrealdb::engine::local::Db>,
        config: &Config,
        gateway: Arc<GatewayClient>,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            users: UserRepository::new(db),
            gateway,
            base_url: config.base_url.clone(),
        }
    }

    /// Build the signed gateway redirect for a pending-payment order.
    pub async fn initiate(
        &self,
        request: PaymentRequest,
        buyer_id: &str,
    ) -> Result<PaymentResponse, PaymentError> {
        let order = match self.orders.find_by_id(&request.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) | Err(RepoError::Validation(_)) => {
                return Err(PaymentError::OrderNotFound(request.order_id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if order.buyer_id != buyer_id {
            return Err(PaymentError::NotOrderOwner);
        }
        if order.status != OrderStatus::PendingPayment {
            return Err(PaymentError::NotPayable(order.status));
        }
        if order.payment_id.is_some() {
            // Re-initiating is allowed; the previous attempt never completed
            warn!(order_id = %request.order_id, "payment already initiated for order");
        }

        let buyer = self
            .users
            .find_by_id(buyer_id)
            .await
            .ok()
            .flatten();
        let (name_first, name_last) = buyer
            .map(|u| (u.first_name, u.last_name))
            .unwrap_or_default();

        let gateway_config = self.gateway.config();
        let order_id = order.id_string();
        let amount = money::round_money(order.total).to_string();

        let mut params: Vec<(String, String)> = vec![
            (
                "merchant_id".to_string(),
                gateway_config.merchant_id.clone(),
            ),
            (
                "merchant_key".to_string(),
                gateway_config.merchant_key.clone(),
            ),
            (
                "return_url".to_string(),
                request
                    .return_url
                    .unwrap_or_else(|| format!("{}/api/payments/return", self.base_url)),
            ),
            (
                "cancel_url".to_string(),
                request
                    .cancel_url
                    .unwrap_or_else(|| format!("{}/api/payments/cancel", self.base_url)),
            ),
            (
                "notify_url".to_string(),
                request
                    .notify_url
                    .unwrap_or_else(|| format!("{}/api/payments/notify", self.base_url)),
            ),
            ("m_payment_id".to_string(), order_id.clone()),
            ("amount".to_string(), amount),
            ("item_name".to_string(), format!("Order {order_id}")),
            ("name_first".to_string(), name_first),
            ("name_last".to_string(), name_last),
            ("email_address".to_string(), order.contact_email.clone()),
        ];

        let sig = signature::generate(&params, gateway_config.passphrase.as_deref());
        params.push(("signature".to_string(), sig));

        let payment_url = self
            .gateway
            .redirect_url(&params)
            .map_err(|e| PaymentError::Internal(e.to_string()))?;

        Ok(PaymentResponse {
            payment_url: payment_url.to_string(),
            payment_reference: uuid::Uuid::new_v4().to_string(),
        })
    }
}

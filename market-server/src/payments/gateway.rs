//! Payment Gateway Client
//!
//! Outbound side of the gateway integration: building the signed
//! redirect URL and the synchronous verification POST. The verification
//! call carries a bounded timeout and is made without holding any order
//! or inventory lock — an unresponsive gateway must not stall the rest
//! of the engine. A timeout is a verification failure; the gateway is
//! expected to retry the notification.

use async_trait::async_trait;
use reqwest::Url;
use tracing::{error, info};

use shared::payment::PaymentNotification;

use crate::core::GatewayConfig;
use crate::utils::AppError;

/// Expected verification response body
const VALID_TOKEN: &str = "VALID";

/// Seam for the synchronous gateway verification call
#[async_trait]
pub trait GatewayVerifier: Send + Sync {
    /// Ask the gateway whether it really issued this notification
    async fn verify(&self, notification: &PaymentNotification) -> bool;
}

/// HTTP client for the payment gateway
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.verify_timeout_ms))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build gateway client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the fully-formed redirect URL from signed parameters
    pub fn redirect_url(&self, params: &[(String, String)]) -> Result<Url, AppError> {
        Url::parse_with_params(&self.config.redirect_url, params)
            .map_err(|e| AppError::internal(format!("Invalid gateway redirect URL: {e}")))
    }
}

#[async_trait]
impl GatewayVerifier for GatewayClient {
    async fn verify(&self, notification: &PaymentNotification) -> bool {
        let pairs = notification.verify_pairs(&self.config.merchant_key);

        let response = match self
            .http
            .post(&self.config.validate_url)
            .form(&pairs)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Covers timeouts: treated as a failed verification
                error!(error = %e, "gateway verification request failed");
                return false;
            }
        };

        if !response.status().is_success() {
            error!(
                status = %response.status(),
                "gateway verification returned non-success status"
            );
            return false;
        }

        match response.text().await {
            Ok(body) if body.trim().eq_ignore_ascii_case(VALID_TOKEN) => {
                info!(
                    payment_id = notification.payment_id.as_deref().unwrap_or("-"),
                    "gateway confirmed notification"
                );
                true
            }
            Ok(body) => {
                error!(body = %body.trim(), "gateway rejected notification");
                false
            }
            Err(e) => {
                error!(error = %e, "failed to read gateway verification response");
                false
            }
        }
    }
}

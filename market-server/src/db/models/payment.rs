//! Payment API payload types

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Initiate payment payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentRequest {
    #[validate(length(min = 1, message = "order id is required"))]
    pub order_id: String,
    /// URL to redirect to after successful payment
    pub return_url: Option<String>,
    /// URL to redirect to after cancelled payment
    pub cancel_url: Option<String>,
    /// URL for the gateway to post notifications to (webhook)
    pub notify_url: Option<String>,
}

/// Initiate payment response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Fully-formed gateway redirect URL
    pub payment_url: String,
    /// Opaque reference for this payment attempt
    pub payment_reference: String,
}

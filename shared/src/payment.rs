//! Untrusted payment gateway notification payload
//!
//! The gateway posts these form-encoded to the webhook endpoint. Every
//! field is optional at the wire level — the reconciler's pipeline, not
//! the deserializer, decides what a usable notification looks like.
//! Amounts stay as raw strings here so that signature recomputation uses
//! exactly the bytes the gateway signed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Claimed payment state, parsed from the gateway's `payment_status` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimedStatus {
    /// The gateway claims funds were captured
    Complete,
    /// The gateway claims the payment attempt failed
    Failed,
    /// Anything else (PENDING, partial refund states, unknown values)
    Other,
}

/// Instant transaction notification as delivered by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Gateway-side payment id
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Our order reference, echoed back by the gateway
    #[serde(default)]
    pub m_payment_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    /// Gross amount as the gateway formatted it
    #[serde(default)]
    pub amount_gross: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Integrity signature over the notification fields
    #[serde(default)]
    pub signature: Option<String>,
    /// Gateway payment token (opaque, stored nowhere)
    #[serde(default)]
    pub token: Option<String>,
}

impl PaymentNotification {
    /// Parse the claimed status. Absent status is `Other`.
    pub fn claimed_status(&self) -> ClaimedStatus {
        match self.payment_status.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("COMPLETE") => ClaimedStatus::Complete,
            Some(s) if s.eq_ignore_ascii_case("FAILED") => ClaimedStatus::Failed,
            _ => ClaimedStatus::Other,
        }
    }

    /// Parse the claimed gross amount, if present and well-formed
    pub fn amount(&self) -> Option<Decimal> {
        self.amount_gross
            .as_deref()
            .and_then(|s| Decimal::from_str(s.trim()).ok())
    }

    /// The (name, value) pairs covered by the integrity signature.
    /// `merchant_key` is a shared secret the gateway includes in its own
    /// computation but never transmits.
    pub fn signature_pairs(&self, merchant_key: &str) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(6);
        if let Some(v) = &self.merchant_id {
            pairs.push(("merchant_id".to_string(), v.clone()));
        }
        pairs.push(("merchant_key".to_string(), merchant_key.to_string()));
        if let Some(v) = &self.payment_id {
            pairs.push(("payment_id".to_string(), v.clone()));
        }
        if let Some(v) = &self.m_payment_id {
            pairs.push(("m_payment_id".to_string(), v.clone()));
        }
        if let Some(v) = &self.amount_gross {
            pairs.push(("amount_gross".to_string(), v.clone()));
        }
        if let Some(v) = &self.payment_status {
            pairs.push(("payment_status".to_string(), v.clone()));
        }
        pairs
    }

    /// The core fields re-submitted to the gateway's verification endpoint
    pub fn verify_pairs(&self, merchant_key: &str) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(5);
        if let Some(v) = &self.merchant_id {
            pairs.push(("merchant_id".to_string(), v.clone()));
        }
        pairs.push(("merchant_key".to_string(), merchant_key.to_string()));
        if let Some(v) = &self.payment_id {
            pairs.push(("payment_id".to_string(), v.clone()));
        }
        if let Some(v) = &self.m_payment_id {
            pairs.push(("m_payment_id".to_string(), v.clone()));
        }
        if let Some(v) = &self.amount_gross {
            pairs.push(("amount_gross".to_string(), v.clone()));
        }
        pairs
    }
}

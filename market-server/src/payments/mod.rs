//! Payments Module
//!
//! - **signature**: deterministic parameter signature shared by outbound
//!   redirects and inbound notification verification
//! - **gateway**: redirect URL construction and the synchronous
//!   verification call to the gateway
//! - **service**: payment initiation (no status mutation)
//! - **reconciler**: the ordered guard chain that turns an untrusted
//!   gateway notification into at most one trusted state transition

pub mod gateway;
pub mod reconciler;
pub mod service;
pub mod signature;

// Re-exports
pub use gateway::{GatewayClient, GatewayVerifier};
pub use reconciler::{PaymentReconciler, ReconcileOutcome, RejectStage};
pub use service::{PaymentError, PaymentService};

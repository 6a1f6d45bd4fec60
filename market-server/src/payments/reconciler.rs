//! Payment Webhook Reconciler
//!
//! Turns an untrusted gateway notification into at most one trusted
//! state transition. The pipeline is a strict ordered chain of
//! independent guards, each short-circuiting to "reject, do not mutate":
//!
//! ```text
//! origin IP → field completeness → merchant id → signature
//!     → gateway re-verification (no locks held)
//!     → order resolution → amount tolerance
//!     → [under the order lock, fresh read]
//!       idempotency guard → terminal-state guard → effect
//! ```
//!
//! Rejections never surface as errors to the webhook caller; the
//! handler maps the outcome to a single success/failure acknowledgment
//! that drives the gateway's retry behaviour. Running the pipeline
//! twice for byte-identical input applies the payment exactly once.

use std::sync::Arc;

use tracing::{error, info, warn};

use shared::payment::{ClaimedStatus, PaymentNotification};

use crate::core::{Config, GatewayConfig, OrderLocks};
use crate::db::repository::{OrderRepository, RepoError};
use crate::orders::money;
use crate::orders::service::{OrderService, PaymentApplication};
use crate::payments::gateway::{GatewayClient, GatewayVerifier};
use crate::payments::signature;

/// Pipeline stage at which a notification was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectStage {
    Origin,
    MissingFields,
    MerchantMismatch,
    SignatureMismatch,
    GatewayVerification,
    InvalidOrderReference,
    AmountMismatch,
    TerminalState,
    TransitionFailed,
}

impl RejectStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectStage::Origin => "origin",
            RejectStage::MissingFields => "missing_fields",
            RejectStage::MerchantMismatch => "merchant_mismatch",
            RejectStage::SignatureMismatch => "signature_mismatch",
            RejectStage::GatewayVerification => "gateway_verification",
            RejectStage::InvalidOrderReference => "invalid_order_reference",
            RejectStage::AmountMismatch => "amount_mismatch",
            RejectStage::TerminalState => "terminal_state",
            RejectStage::TransitionFailed => "transition_failed",
        }
    }
}

/// Result of processing one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment applied: one transition to PAYMENT_COMPLETED
    Applied,
    /// Duplicate delivery of an already-applied payment — acknowledged
    AlreadyApplied,
    /// Non-actionable status (failed/other) — acknowledged, no mutation
    Acknowledged,
    /// Rejected at a pipeline stage — no mutation
    Rejected(RejectStage),
}

impl ReconcileOutcome {
    /// The single boolean signal returned to the gateway
    pub fn is_success(&self) -> bool {
        !matches!(self, ReconcileOutcome::Rejected(_))
    }
}

/// Payment webhook reconciler
pub struct PaymentReconciler {
    orders: OrderRepository,
    service: OrderService,
    verifier: Arc<dyn GatewayVerifier>,
    gateway_config: GatewayConfig,
}

impl PaymentReconciler {
    pub fn new(
        db: surrealdb::Surreal<surrealdb::engine::local::Db>,
        config: &Config,
        gateway: Arc<GatewayClient>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self::with_verifier(db, config, gateway, locks)
    }

    /// Construct with an explicit verifier (tests stub the gateway here)
    pub fn with_verifier(
        db: surrealdb::Surreal<surrealdb::engine::local::Db>,
        config: &Config,
        verifier: Arc<dyn GatewayVerifier>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            service: OrderService::new(db, config, locks),
            verifier,
            gateway_config: config.gateway.clone(),
        }
    }

    /// Run the full pipeline for one notification.
    ///
    /// Never returns an error to the caller; every failure mode resolves
    /// to an outcome. Safe to run repeatedly for the identical input.
    pub async fn process(
        &self,
        notification: &PaymentNotification,
        peer_ip: &str,
    ) -> ReconcileOutcome {
        info!(
            peer_ip = %peer_ip,
            payload = %serde_json::to_string(notification).unwrap_or_default(),
            "received payment notification"
        );

        // Stages 1-4: pure guards on the notification itself
        if let Err(stage) = self
            .check_origin(peer_ip)
            .and_then(|()| self.check_completeness(notification))
            .and_then(|()| self.check_merchant(notification))
            .and_then(|()| self.check_signature(notification))
        {
            return self.reject(notification, stage);
        }

        // Stage 5: ask the gateway itself, before touching any order state
        if !self.verifier.verify(notification).await {
            return self.reject(notification, RejectStage::GatewayVerification);
        }

        // Stage 6: resolve the claimed order
        let order_id = notification.m_payment_id.as_deref().unwrap_or_default();
        let order = match self.orders.find_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) | Err(RepoError::Validation(_)) => {
                return self.reject(notification, RejectStage::InvalidOrderReference);
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "order lookup failed during reconciliation");
                return self.reject(notification, RejectStage::TransitionFailed);
            }
        };

        // Stage 7: amount reconciliation with fixed absolute tolerance
        let claimed = notification.amount().unwrap_or_default();
        if !money::within_tolerance(claimed, order.total) {
            error!(
                order_id = %order_id,
                expected = %order.total,
                received = %claimed,
                "payment amount mismatch"
            );
            return self.reject(notification, RejectStage::AmountMismatch);
        }

        // Stages 8-10: status-specific effect, idempotency and terminal
        // guards run under the order lock on a fresh read
        match notification.claimed_status() {
            ClaimedStatus::Complete => self.apply_complete(notification, order_id).await,
            ClaimedStatus::Failed => {
                // Payment failure is not order cancellation; the expiry
                // reaper eventually reclaims the stock
                warn!(order_id = %order_id, "gateway reported failed payment");
                ReconcileOutcome::Acknowledged
            }
            ClaimedStatus::Other => {
                info!(
                    order_id = %order_id,
                    status = notification.payment_status.as_deref().unwrap_or("-"),
                    "non-actionable payment status acknowledged"
                );
                ReconcileOutcome::Acknowledged
            }
        }
    }

    async fn apply_complete(
        &self,
        notification: &PaymentNotification,
        order_id: &str,
    ) -> ReconcileOutcome {
        let payment_reference = notification.payment_id.as_deref().unwrap_or_default();

        match self.service.complete_payment(order_id, payment_reference).await {
            Ok(PaymentApplication::Applied(_)) => {
                info!(order_id = %order_id, payment_id = %payment_reference, "payment reconciled");
                ReconcileOutcome::Applied
            }
            Ok(PaymentApplication::AlreadyApplied(_)) => {
                info!(
                    order_id = %order_id,
                    "order already paid, duplicate notification acknowledged"
                );
                ReconcileOutcome::AlreadyApplied
            }
            Ok(PaymentApplication::Closed(status)) => {
                // Money arrived for an order the system already closed
                error!(
                    order_id = %order_id,
                    status = %status,
                    payment_id = %payment_reference,
                    "payment received for closed order, manual reconciliation required"
                );
                self.reject(notification, RejectStage::TerminalState)
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "failed to apply payment");
                self.reject(notification, RejectStage::TransitionFailed)
            }
        }
    }

    fn reject(&self, notification: &PaymentNotification, stage: RejectStage) -> ReconcileOutcome {
        warn!(
            stage = stage.as_str(),
            order_id = notification.m_payment_id.as_deref().unwrap_or("-"),
            payment_id = notification.payment_id.as_deref().unwrap_or("-"),
            "payment notification rejected"
        );
        ReconcileOutcome::Rejected(stage)
    }

    // =========================================================================
    // Guards (each independently testable)
    // =========================================================================

    /// Stage 1: caller IP must be allow-listed. An empty allow-list is an
    /// explicit degraded mode that accepts everything but logs loudly.
    fn check_origin(&self, peer_ip: &str) -> Result<(), RejectStage> {
        if self.gateway_config.allowed_ips.is_empty() {
            warn!("no allowed notifier IPs configured, accepting all origins (degraded mode)");
            return Ok(());
        }
        if self
            .gateway_config
            .allowed_ips
            .iter()
            .any(|ip| ip == peer_ip)
        {
            Ok(())
        } else {
            warn!(peer_ip = %peer_ip, "payment notification from unauthorized IP");
            Err(RejectStage::Origin)
        }
    }

    /// Stage 2: payment id, order id, merchant id and a parseable amount
    /// must all be present.
    fn check_completeness(&self, n: &PaymentNotification) -> Result<(), RejectStage> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if present(&n.payment_id)
            && present(&n.m_payment_id)
            && present(&n.merchant_id)
            && n.amount().is_some()
        {
            Ok(())
        } else {
            Err(RejectStage::MissingFields)
        }
    }

    /// Stage 3: the claimed merchant must be us
    fn check_merchant(&self, n: &PaymentNotification) -> Result<(), RejectStage> {
        if n.merchant_id.as_deref() == Some(self.gateway_config.merchant_id.as_str()) {
            Ok(())
        } else {
            Err(RejectStage::MerchantMismatch)
        }
    }

    /// Stage 4: recompute the signature when one is present
    fn check_signature(&self, n: &PaymentNotification) -> Result<(), RejectStage> {
        let Some(provided) = n.signature.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let pairs = n.signature_pairs(&self.gateway_config.merchant_key);
        if signature::verify(&pairs, self.gateway_config.passphrase.as_deref(), provided) {
            Ok(())
        } else {
            Err(RejectStage::SignatureMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GatewayConfig;
    use crate::db::DbService;
    use crate::db::models::{
        CreateOrderItemRequest, CreateOrderRequest, ListingCreate, UserCreate,
    };
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use shared::order::{Actor, OrderStatus, Role};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway stub: fixed verdict, counts calls
    struct StubVerifier {
        verdict: bool,
        calls: AtomicUsize,
    }

    impl StubVerifier {
        fn new(verdict: bool) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GatewayVerifier for StubVerifier {
        async fn verify(&self, _notification: &PaymentNotification) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn test_config(allowed_ips: Vec<String>) -> Config {
        Config {
            work_dir: "/tmp/partsmarket-test".to_string(),
            http_port: 0,
            environment: "development".to_string(),
            base_url: "http://localhost:3000".to_string(),
            tax_rate: Decimal::from_str("0.15").unwrap(),
            shipping_fee: Decimal::from_str("100.00").unwrap(),
            order_expiry_minutes: 1440,
            order_expiry_scan_secs: 60,
            gateway: GatewayConfig {
                merchant_id: "10000100".to_string(),
                merchant_key: "46f0cd694581a".to_string(),
                passphrase: Some("jt7NOE43FZPn".to_string()),
                redirect_url: "https://gateway.example/process".to_string(),
                validate_url: "https://gateway.example/validate".to_string(),
                allowed_ips,
                verify_timeout_ms: 1_000,
            },
        }
    }

    struct Fixture {
        reconciler: PaymentReconciler,
        orders: OrderService,
        buyer: Actor,
        order_id: String,
        /// order total, formatted as the gateway would echo it
        amount: String,
    }

    async fn setup_with(verifier: Arc<dyn GatewayVerifier>, allowed_ips: Vec<String>) -> Fixture {
        let db = DbService::memory().await.unwrap().db;
        let config = test_config(allowed_ips);
        let locks = Arc::new(OrderLocks::new());
        let reconciler =
            PaymentReconciler::with_verifier(db.clone(), &config, verifier, locks.clone());
        let orders = OrderService::new(db.clone(), &config, locks);

        let users = crate::db::repository::UserRepository::new(db.clone());
        let buyer = users
            .create(UserCreate {
                first_name: "Thandi".to_string(),
                last_name: "Ngwenya".to_string(),
                email: "thandi@example.com".to_string(),
                role: Role::Buyer,
            })
            .await
            .unwrap();
        let seller = users
            .create(UserCreate {
                first_name: "Pieter".to_string(),
                last_name: "Botha".to_string(),
                email: "pieter@example.com".to_string(),
                role: Role::Seller,
            })
            .await
            .unwrap();

        let listing = crate::db::repository::ListingRepository::new(db)
            .create(ListingCreate {
                seller_id: seller.id_string(),
                title: "Radiator".to_string(),
                price: Decimal::from_str("500.00").unwrap(),
                quantity: 5,
                active: true,
            })
            .await
            .unwrap();

        let buyer_id = buyer.id_string();
        let dto = orders
            .create_order(
                CreateOrderRequest {
                    items: vec![CreateOrderItemRequest {
                        listing_id: listing.id_string(),
                        quantity: 2,
                    }],
                    shipping_address: "12 Long Street".to_string(),
                    shipping_city: "Cape Town".to_string(),
                    shipping_postal_code: "8001".to_string(),
                    shipping_province: "Western Cape".to_string(),
                    contact_phone: "+27215550123".to_string(),
                    contact_email: "thandi@example.com".to_string(),
                },
                &buyer_id,
            )
            .await
            .unwrap();

        Fixture {
            reconciler,
            orders,
            buyer: Actor::Buyer { user_id: buyer_id },
            order_id: dto.id,
            amount: dto.total.to_string(),
        }
    }

    /// A fully valid COMPLETE notification with a correct signature
    fn complete_notification(f: &Fixture) -> PaymentNotification {
        let mut n = PaymentNotification {
            payment_id: Some("pf-889900".to_string()),
            m_payment_id: Some(f.order_id.clone()),
            merchant_id: Some("10000100".to_string()),
            amount_gross: Some(f.amount.clone()),
            payment_status: Some("COMPLETE".to_string()),
            signature: None,
            token: None,
        };
        let pairs = n.signature_pairs("46f0cd694581a");
        n.signature = Some(signature::generate(&pairs, Some("jt7NOE43FZPn")));
        n
    }

    #[tokio::test]
    async fn test_complete_notification_applies_once() {
        let verifier = StubVerifier::new(true);
        let f = setup_with(verifier.clone(), vec![]).await;
        let n = complete_notification(&f);

        let first = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(first, ReconcileOutcome::Applied);
        assert!(first.is_success());

        // Byte-identical redelivery: acknowledged without re-mutating
        let second = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(second, ReconcileOutcome::AlreadyApplied);
        assert!(second.is_success());

        let order = f
            .orders
            .get_order(&f.order_id, &f.buyer)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::PaymentCompleted);
        assert_eq!(order.payment_id.as_deref(), Some("pf-889900"));

        // The pipeline itself ran twice (gateway re-checked both times)
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected_without_mutation() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let mut n = complete_notification(&f);
        n.signature = Some("deadbeef".repeat(8));

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::SignatureMismatch)
        );
        assert!(!outcome.is_success());

        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(order.payment_id.is_none());
    }

    #[tokio::test]
    async fn test_unsigned_notification_passes_signature_stage() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let mut n = complete_notification(&f);
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(outcome, ReconcileOutcome::Applied);
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;

        for strip in ["payment_id", "m_payment_id", "merchant_id", "amount_gross"] {
            let mut n = complete_notification(&f);
            n.signature = None;
            match strip {
                "payment_id" => n.payment_id = None,
                "m_payment_id" => n.m_payment_id = None,
                "merchant_id" => n.merchant_id = None,
                _ => n.amount_gross = None,
            }
            let outcome = f.reconciler.process(&n, "196.33.227.224").await;
            assert_eq!(
                outcome,
                ReconcileOutcome::Rejected(RejectStage::MissingFields),
                "field {strip} missing should reject"
            );
        }
    }

    #[tokio::test]
    async fn test_merchant_mismatch_rejected() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let mut n = complete_notification(&f);
        n.merchant_id = Some("99999999".to_string());
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::MerchantMismatch)
        );
    }

    #[tokio::test]
    async fn test_origin_allow_list() {
        let verifier = StubVerifier::new(true);
        let f = setup_with(
            verifier.clone(),
            vec!["196.33.227.224".to_string(), "196.33.227.225".to_string()],
        )
        .await;
        let n = complete_notification(&f);

        let outcome = f.reconciler.process(&n, "10.0.0.1").await;
        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectStage::Origin));
        // Rejected before the gateway was ever contacted
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);

        let outcome = f.reconciler.process(&n, "196.33.227.225").await;
        assert_eq!(outcome, ReconcileOutcome::Applied);
    }

    #[tokio::test]
    async fn test_gateway_verification_failure_rejected() {
        let f = setup_with(StubVerifier::new(false), vec![]).await;
        let n = complete_notification(&f);

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::GatewayVerification)
        );

        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_unknown_order_rejected() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let mut n = complete_notification(&f);
        n.m_payment_id = Some("order:doesnotexist".to_string());
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::InvalidOrderReference)
        );

        // Malformed reference takes the same path
        n.m_payment_id = Some("not-an-id".to_string());
        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::InvalidOrderReference)
        );
    }

    #[tokio::test]
    async fn test_amount_mismatch_rejected_and_tolerance_absorbed() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;

        // 0.01 off: inside the absolute tolerance
        let total = Decimal::from_str(&f.amount).unwrap();
        let mut n = complete_notification(&f);
        n.amount_gross = Some((total + Decimal::from_str("0.01").unwrap()).to_string());
        n.signature = None;
        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(outcome, ReconcileOutcome::Applied);
    }

    #[tokio::test]
    async fn test_amount_mismatch_beyond_tolerance() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let total = Decimal::from_str(&f.amount).unwrap();

        let mut n = complete_notification(&f);
        n.amount_gross = Some((total - Decimal::from_str("0.02").unwrap()).to_string());
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::AmountMismatch)
        );

        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_failed_payment_acknowledged_without_mutation() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let mut n = complete_notification(&f);
        n.payment_status = Some("FAILED".to_string());
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(outcome, ReconcileOutcome::Acknowledged);
        assert!(outcome.is_success());

        // Failure is not cancellation: order stays pending, stock reserved
        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_pending_status_acknowledged_without_mutation() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let mut n = complete_notification(&f);
        n.payment_status = Some("PENDING".to_string());
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(outcome, ReconcileOutcome::Acknowledged);

        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_complete_for_cancelled_order_rejected() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        f.orders
            .update_status(&f.order_id, OrderStatus::Cancelled, &f.buyer, None)
            .await
            .unwrap();

        let mut n = complete_notification(&f);
        n.signature = None;

        let outcome = f.reconciler.process(&n, "196.33.227.224").await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectStage::TerminalState)
        );
        assert!(!outcome.is_success());

        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.payment_id.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_delivery_single_application() {
        let f = setup_with(StubVerifier::new(true), vec![]).await;
        let n = complete_notification(&f);

        // Same logical event delivered twice, concurrently
        let (a, b) = tokio::join!(
            f.reconciler.process(&n, "196.33.227.224"),
            f.reconciler.process(&n, "196.33.227.224"),
        );

        let applied = [a, b]
            .iter()
            .filter(|o| **o == ReconcileOutcome::Applied)
            .count();
        assert_eq!(applied, 1, "exactly one delivery may apply the payment");
        assert!(a.is_success() && b.is_success());

        let order = f.orders.get_order(&f.order_id, &f.buyer).await.unwrap();
        assert_eq!(order.status, OrderStatus::PaymentCompleted);
        assert_eq!(order.payment_id.as_deref(), Some("pf-889900"));
    }
}

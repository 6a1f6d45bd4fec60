//! Notification Sink
//!
//! Persists notification records for later delivery by the external
//! notification collaborator. Strictly fire-and-forget: a failure here
//! is logged and dropped, never propagated into the order or payment
//! flow that triggered it.

use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use tracing::warn;

use shared::order::OrderStatus;

use crate::db::models::NotificationKind;
use crate::db::repository::NotificationRepository;

/// Fire-and-forget notification writer
#[derive(Clone)]
pub struct NotificationService {
    repo: NotificationRepository,
}

impl NotificationService {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            repo: NotificationRepository::new(db),
        }
    }

    async fn persist(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
        reference_id: &str,
        link: String,
    ) {
        if let Err(e) = self
            .repo
            .create(
                recipient_id,
                kind,
                title,
                body,
                Some(reference_id.to_string()),
                Some(link),
            )
            .await
        {
            warn!(
                recipient_id = %recipient_id,
                kind = ?kind,
                error = %e,
                "failed to persist notification, dropped"
            );
        }
    }

    /// Buyer: your order was placed
    pub async fn order_created(&self, buyer_id: &str, order_id: &str) {
        self.persist(
            buyer_id,
            NotificationKind::OrderCreated,
            "Order Placed",
            "Your order has been placed and is awaiting payment.",
            order_id,
            format!("/orders/{order_id}"),
        )
        .await;
    }

    /// Seller: one of your listings was ordered
    pub async fn new_order(&self, seller_id: &str, order_id: &str) {
        self.persist(
            seller_id,
            NotificationKind::ListingSold,
            "New Order Received",
            "You have received a new order.",
            order_id,
            format!("/seller/orders/{order_id}"),
        )
        .await;
    }

    /// Buyer or seller: the order changed status
    pub async fn status_updated(
        &self,
        recipient_id: &str,
        order_id: &str,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) {
        self.persist(
            recipient_id,
            NotificationKind::OrderStatusUpdated,
            "Order Status Updated",
            &format!("Order status changed from {old_status} to {new_status}."),
            order_id,
            format!("/orders/{order_id}"),
        )
        .await;
    }

    /// Buyer: payment confirmed
    pub async fn payment_received(&self, buyer_id: &str, order_id: &str) {
        self.persist(
            buyer_id,
            NotificationKind::PaymentSuccessful,
            "Payment Received",
            "Your payment has been received. The seller will process your order.",
            order_id,
            format!("/orders/{order_id}"),
        )
        .await;
    }
}

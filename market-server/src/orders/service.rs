//! Order Service - placement commit protocol and status state machine
//!
//! Mutations on one order serialize through its entry in [`OrderLocks`]:
//! a transition always re-reads the order under the lock, so two
//! concurrent requests can never both succeed from the same prior
//! status. Inventory is reserved before the order row exists and
//! released exactly once when it is cancelled.

use std::sync::Arc;

use rust_decimal::Decimal;
use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use thiserror::Error;
use tracing::{info, warn};

use shared::order::{Actor, OrderStatus, OrderView, authorize};

use crate::core::{Config, OrderLocks};
use crate::db::models::{CreateOrderRequest, Order, OrderDto, OrderItem};
use crate::db::repository::{
    ListingRepository, OrderRepository, RepoError, UserRepository,
};
use crate::notify::NotificationService;
use crate::orders::inventory::{InventoryLedger, LedgerError};
use crate::orders::money;
use crate::utils::AppError;

/// Order service errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("listing not found: {0}")]
    ListingNotFound(String),

    #[error("listing is not active: {0}")]
    ListingInactive(String),

    #[error("insufficient stock for {listing_id}: requested {requested}, available {available}")]
    InsufficientStock {
        listing_id: String,
        requested: i64,
        available: i64,
    },

    #[error("order must contain at least one item")]
    EmptyOrder,

    #[error("invalid quantity for listing {0}")]
    InvalidQuantity(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RepoError> for OrderError {
    fn from(e: RepoError) -> Self {
        OrderError::Storage(e.to_string())
    }
}

impl From<LedgerError> for OrderError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => OrderError::ListingNotFound(id),
            LedgerError::Inactive(title) => OrderError::ListingInactive(title),
            LedgerError::InsufficientStock {
                listing_id,
                requested,
                available,
            } => OrderError::InsufficientStock {
                listing_id,
                requested,
                available,
            },
            LedgerError::Storage(msg) => OrderError::Storage(msg),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match &e {
            OrderError::UserNotFound(_)
            | OrderError::OrderNotFound(_)
            | OrderError::ListingNotFound(_) => AppError::not_found(e.to_string()),
            OrderError::ListingInactive(_) => AppError::business_rule(e.to_string()),
            OrderError::InsufficientStock { .. } => AppError::conflict(e.to_string()),
            OrderError::EmptyOrder | OrderError::InvalidQuantity(_) => {
                AppError::validation(e.to_string())
            }
            OrderError::InvalidTransition { .. } => AppError::business_rule(e.to_string()),
            OrderError::Unauthorized(_) => AppError::forbidden(e.to_string()),
            OrderError::Storage(_) => AppError::database(e.to_string()),
        }
    }
}

/// Outcome of applying a verified payment to an order
#[derive(Debug)]
pub enum PaymentApplication {
    /// Transitioned to PAYMENT_COMPLETED and stored the gateway reference
    Applied(Order),
    /// The order already reflects this payment — idempotent no-op
    AlreadyApplied(Order),
    /// The order was already closed (cancelled/refunded); money arrived
    /// for a dead order and needs manual reconciliation
    Closed(OrderStatus),
}

/// Order lifecycle service
#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
    users: UserRepository,
    listings: ListingRepository,
    ledger: InventoryLedger,
    notifier: NotificationService,
    locks: Arc<OrderLocks>,
    tax_rate: Decimal,
    shipping_fee: Decimal,
}

impl OrderService {
    pub fn new(db: Surreal<Db>, config: &Config, locks: Arc<OrderLocks>) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            users: UserRepository::new(db.clone()),
            listings: ListingRepository::new(db.clone()),
            ledger: InventoryLedger::new(db.clone()),
            notifier: NotificationService::new(db),
            locks,
            tax_rate: config.tax_rate,
            shipping_fee: config.shipping_fee,
        }
    }

    /// Load an order or fail with a typed not-found
    async fn load_order(&self, order_id: &str) -> Result<Order, OrderError> {
        match self.orders.find_by_id(order_id).await {
            Ok(Some(order)) => Ok(order),
            Ok(None) | Err(RepoError::Validation(_)) => {
                Err(OrderError::OrderNotFound(order_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn seller_ids(items: &[OrderItem]) -> Vec<String> {
        let mut ids: Vec<String> = items.iter().map(|i| i.seller_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    // =========================================================================
    // Placement (commit protocol)
    // =========================================================================

    /// Place a new order for `buyer_id`.
    ///
    /// Reserves inventory for every item before the order exists; any
    /// failure rolls back the reservations of this request, so either
    /// the whole order commits or inventory is untouched. Prices are
    /// snapshotted at this instant and never change afterwards.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        buyer_id: &str,
    ) -> Result<OrderDto, OrderError> {
        if request.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        for item in &request.items {
            if item.quantity < 1 {
                return Err(OrderError::InvalidQuantity(item.listing_id.clone()));
            }
        }

        match self.users.find_by_id(buyer_id).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(RepoError::Validation(_)) => {
                return Err(OrderError::UserNotFound(buyer_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        // Validate listings and snapshot prices
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let listing = match self.listings.find_by_id(&item.listing_id).await {
                Ok(Some(listing)) => listing,
                Ok(None) | Err(RepoError::Validation(_)) => {
                    return Err(OrderError::ListingNotFound(item.listing_id.clone()));
                }
                Err(e) => return Err(e.into()),
            };
            if !listing.active {
                return Err(OrderError::ListingInactive(listing.title));
            }
            lines.push((listing, item.quantity));
        }

        // Reserve inventory; the ledger re-checks stock and active state
        // atomically per listing and rolls back this request on failure
        let wants: Vec<(String, i64)> = lines
            .iter()
            .map(|(listing, qty)| (listing.id_string(), *qty))
            .collect();
        self.ledger.reserve_all(&wants).await?;

        // Totals from the price snapshot
        let now = shared::util::now_millis();
        let order_key = uuid::Uuid::new_v4().simple().to_string();
        let order_id = surrealdb::RecordId::from_table_key("order", order_key.as_str()).to_string();

        let mut subtotal = Decimal::ZERO;
        let mut items = Vec::with_capacity(lines.len());
        for (listing, qty) in &lines {
            let line_total = money::line_total(listing.price, *qty);
            subtotal += line_total;
            items.push(OrderItem {
                id: None,
                order_id: order_id.clone(),
                listing_id: listing.id_string(),
                seller_id: listing.seller_id.clone(),
                listing_title: listing.title.clone(),
                quantity: *qty,
                unit_price: listing.price,
                line_total,
                created_at: now,
            });
        }

        let tax_amount = money::compute_tax(subtotal, self.tax_rate);
        let total = subtotal + self.shipping_fee + tax_amount;

        let order = Order {
            id: None,
            buyer_id: buyer_id.to_string(),
            status: OrderStatus::PendingPayment,
            subtotal,
            shipping_fee: self.shipping_fee,
            tax_amount,
            total,
            shipping_address: request.shipping_address,
            shipping_city: request.shipping_city,
            shipping_postal_code: request.shipping_postal_code,
            shipping_province: request.shipping_province,
            contact_phone: request.contact_phone,
            contact_email: request.contact_email,
            tracking_number: None,
            payment_id: None,
            payment_date: None,
            shipped_date: None,
            delivered_date: None,
            cancelled_date: None,
            created_at: now,
            updated_at: now,
        };

        // Persist order + items atomically; reservations are returned if
        // the write fails
        if let Err(e) = self
            .orders
            .create_with_items(&order_key, &order, &items)
            .await
        {
            warn!(order_id = %order_id, error = %e, "order persistence failed, releasing reservations");
            self.ledger.release_all(&wants).await;
            return Err(e.into());
        }

        info!(
            order_id = %order_id,
            buyer_id = %buyer_id,
            total = %total,
            items = items.len(),
            "order placed"
        );

        // Fire-and-forget notifications
        self.notifier.order_created(buyer_id, &order_id).await;
        for seller_id in Self::seller_ids(&items) {
            self.notifier.new_order(&seller_id, &order_id).await;
        }

        let (order, items) = self
            .orders
            .find_with_items(&order_id)
            .await?
            .ok_or_else(|| OrderError::Storage("order vanished after create".to_string()))?;
        Ok(OrderDto::from_parts(order, items))
    }

    // =========================================================================
    // Reads (role-scoped)
    // =========================================================================

    /// Fetch one order, enforcing visibility by actor
    pub async fn get_order(&self, order_id: &str, actor: &Actor) -> Result<OrderDto, OrderError> {
        let order = self.load_order(order_id).await?;
        let items = self.orders.items_for(order_id).await?;

        let visible = match actor {
            Actor::Buyer { user_id } => order.buyer_id == *user_id,
            Actor::Seller { user_id } => items.iter().any(|i| i.seller_id == *user_id),
            Actor::Admin { .. } | Actor::PaymentSystem => true,
        };
        if !visible {
            return Err(OrderError::Unauthorized(
                "You do not have permission to view this order".to_string(),
            ));
        }

        Ok(OrderDto::from_parts(order, items))
    }

    /// Orders placed by a buyer
    pub async fn list_for_buyer(
        &self,
        buyer_id: &str,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OrderDto>, OrderError> {
        let orders = self
            .orders
            .list_by_buyer(buyer_id, status, limit, offset)
            .await?;
        self.with_items(orders).await
    }

    /// Orders containing at least one of the seller's items
    pub async fn list_for_seller(
        &self,
        seller_id: &str,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OrderDto>, OrderError> {
        let orders = self
            .orders
            .list_by_seller(seller_id, status, limit, offset)
            .await?;
        self.with_items(orders).await
    }

    async fn with_items(&self, orders: Vec<Order>) -> Result<Vec<OrderDto>, OrderError> {
        let mut dtos = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.orders.items_for(&order.id_string()).await?;
            dtos.push(OrderDto::from_parts(order, items));
        }
        Ok(dtos)
    }

    // =========================================================================
    // State machine
    // =========================================================================

    /// Request a status transition on behalf of an actor.
    ///
    /// Requesting the current status is a no-op that returns the
    /// unchanged order. Illegal transitions and authority violations
    /// fail without any mutation. Entering CANCELLED releases every
    /// item's reservation exactly once.
    pub async fn update_status(
        &self,
        order_id: &str,
        requested: OrderStatus,
        actor: &Actor,
        tracking_number: Option<String>,
    ) -> Result<OrderDto, OrderError> {
        let lock = self.locks.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;
        let items = self.orders.items_for(order_id).await?;

        // Same status: no-op, not an error
        if order.status == requested {
            return Ok(OrderDto::from_parts(order, items));
        }

        let seller_ids = Self::seller_ids(&items);
        let view = OrderView {
            buyer_id: &order.buyer_id,
            seller_ids: &seller_ids,
        };
        authorize(actor, requested, &view)
            .map_err(|e| OrderError::Unauthorized(e.to_string()))?;

        if !order.status.can_transition_to(requested) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: requested,
            });
        }

        let old_status = order.status;
        let now = shared::util::now_millis();
        let updated = self
            .orders
            .apply_transition(order_id, requested, tracking_number, now)
            .await?;

        info!(
            order_id = %order_id,
            from = %old_status,
            to = %requested,
            actor = %actor.audit_id(),
            "order status updated"
        );

        // Return-to-stock on cancellation. A second cancel is impossible
        // (the transition above already rejected it), so each item is
        // released exactly once.
        if requested == OrderStatus::Cancelled {
            let reserved: Vec<(String, i64)> = items
                .iter()
                .map(|i| (i.listing_id.clone(), i.quantity))
                .collect();
            self.ledger.release_all(&reserved).await;
        }

        // Status-change notifications to buyer and all involved sellers
        self.notifier
            .status_updated(&updated.buyer_id, order_id, old_status, requested)
            .await;
        for seller_id in &seller_ids {
            self.notifier
                .status_updated(seller_id, order_id, old_status, requested)
                .await;
        }

        Ok(OrderDto::from_parts(updated, items))
    }

    /// Apply a gateway-verified payment (payment-system capability).
    ///
    /// Runs under the order lock on a fresh read so duplicate webhook
    /// deliveries collapse to exactly one effective transition.
    pub async fn complete_payment(
        &self,
        order_id: &str,
        payment_reference: &str,
    ) -> Result<PaymentApplication, OrderError> {
        let lock = self.locks.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;

        // Idempotency guard: already paid (or further along) — ack only
        if order.status.is_paid() {
            return Ok(PaymentApplication::AlreadyApplied(order));
        }

        // Terminal guard: money arrived for a closed order
        if order.status.is_terminal() {
            return Ok(PaymentApplication::Closed(order.status));
        }

        let view = OrderView {
            buyer_id: &order.buyer_id,
            seller_ids: &[],
        };
        authorize(&Actor::PaymentSystem, OrderStatus::PaymentCompleted, &view)
            .map_err(|e| OrderError::Unauthorized(e.to_string()))?;

        if !order.status.can_transition_to(OrderStatus::PaymentCompleted) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::PaymentCompleted,
            });
        }

        let now = shared::util::now_millis();
        let updated = self
            .orders
            .mark_paid(order_id, payment_reference, now)
            .await?;

        info!(
            order_id = %order_id,
            payment_reference = %payment_reference,
            "payment applied"
        );

        self.notifier
            .payment_received(&updated.buyer_id, order_id)
            .await;

        Ok(PaymentApplication::Applied(updated))
    }

    /// Cancel a pending-payment order that outlived the configured TTL.
    ///
    /// Re-checks status and age under the order lock so a payment that
    /// lands between the reaper's scan and this call wins the race.
    /// Returns whether the order was actually expired.
    pub async fn expire_pending(&self, order_id: &str, cutoff: i64) -> Result<bool, OrderError> {
        let lock = self.locks.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;
        if order.status != OrderStatus::PendingPayment || order.created_at >= cutoff {
            return Ok(false);
        }

        let items = self.orders.items_for(order_id).await?;
        let now = shared::util::now_millis();
        self.orders
            .apply_transition(order_id, OrderStatus::Cancelled, None, now)
            .await?;

        let reserved: Vec<(String, i64)> = items
            .iter()
            .map(|i| (i.listing_id.clone(), i.quantity))
            .collect();
        self.ledger.release_all(&reserved).await;

        info!(order_id = %order_id, "pending-payment order expired and cancelled");

        self.notifier
            .status_updated(
                &order.buyer_id,
                order_id,
                OrderStatus::PendingPayment,
                OrderStatus::Cancelled,
            )
            .await;

        Ok(true)
    }

    /// Pending orders older than the cutoff (reaper scan)
    pub async fn expired_pending_orders(&self, cutoff: i64) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_expired_pending(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GatewayConfig;
    use crate::db::DbService;
    use crate::db::models::{CreateOrderItemRequest, ListingCreate, UserCreate};
    use shared::order::Role;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn test_config() -> Config {
        Config {
            work_dir: "/tmp/partsmarket-test".to_string(),
            http_port: 0,
            environment: "development".to_string(),
            base_url: "http://localhost:3000".to_string(),
            tax_rate: dec("0.15"),
            shipping_fee: dec("100.00"),
            order_expiry_minutes: 1440,
            order_expiry_scan_secs: 60,
            gateway: GatewayConfig {
                merchant_id: "10000100".to_string(),
                merchant_key: "46f0cd694581a".to_string(),
                passphrase: None,
                redirect_url: "https://gateway.example/process".to_string(),
                validate_url: "https://gateway.example/validate".to_string(),
                allowed_ips: vec![],
                verify_timeout_ms: 1_000,
            },
        }
    }

    struct Fixture {
        db: Surreal<Db>,
        service: OrderService,
        listings: ListingRepository,
        buyer_id: String,
        seller_id: String,
    }

    async fn setup() -> Fixture {
        let db = DbService::memory().await.unwrap().db;
        let config = test_config();
        let service = OrderService::new(db.clone(), &config, Arc::new(OrderLocks::new()));
        let users = UserRepository::new(db.clone());
        let listings = ListingRepository::new(db.clone());

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

        Fixture {
            db,
            service,
            listings,
            buyer_id: buyer.id_string(),
            seller_id: seller.id_string(),
        }
    }

    async fn seed_listing(f: &Fixture, price: &str, quantity: i64) -> String {
        f.listings
            .create(ListingCreate {
                seller_id: f.seller_id.clone(),
                title: "Oil Filter".to_string(),
                price: dec(price),
                quantity,
                active: true,
            })
            .await
            .unwrap()
            .id_string()
    }

    fn order_request(items: Vec<CreateOrderItemRequest>) -> CreateOrderRequest {
        CreateOrderRequest {
            items,
            shipping_address: "12 Long Street".to_string(),
            shipping_city: "Cape Town".to_string(),
            shipping_postal_code: "8001".to_string(),
            shipping_province: "Western Cape".to_string(),
            contact_phone: "+27215550123".to_string(),
            contact_email: "thandi@example.com".to_string(),
        }
    }

    fn buyer(f: &Fixture) -> Actor {
        Actor::Buyer {
            user_id: f.buyer_id.clone(),
        }
    }

    fn seller(f: &Fixture) -> Actor {
        Actor::Seller {
            user_id: f.seller_id.clone(),
        }
    }

    // ========================================================================
    // Placement
    // ========================================================================

    #[tokio::test]
    async fn test_create_order_totals() {
        let f = setup().await;
        let listing = seed_listing(&f, "500.00", 10).await;

        let dto = f
            .service
            .create_order(
                order_request(vec![CreateOrderItemRequest {
                    listing_id: listing.clone(),
                    quantity: 2,
                }]),
                &f.buyer_id,
            )
            .await
            .unwrap();

        // subtotal 1000.00, shipping 100.00, tax 15% = 150.00, total 1250.00
        assert_eq!(dto.status, OrderStatus::PendingPayment);
        assert_eq!(dto.subtotal, dec("1000.00"));
        assert_eq!(dto.shipping_fee, dec("100.00"));
        assert_eq!(dto.tax_amount, dec("150.00"));
        assert_eq!(dto.total, dec("1250.00"));
        assert_eq!(dto.total, dto.subtotal + dto.shipping_fee + dto.tax_amount);
        assert_eq!(dto.items.len(), 1);
        assert_eq!(dto.items[0].unit_price, dec("500.00"));
        assert_eq!(dto.items[0].line_total, dec("1000.00"));

        // Inventory decremented
        let left = f.listings.find_by_id(&listing).await.unwrap().unwrap();
        assert_eq!(left.quantity, 8);
    }

    #[tokio::test]
    async fn test_price_snapshot_survives_listing_price_change() {
        let f = setup().await;
        let listing = seed_listing(&f, "200.00", 5).await;

        let dto = f
            .service
            .create_order(
                order_request(vec![CreateOrderItemRequest {
                    listing_id: listing.clone(),
                    quantity: 1,
                }]),
                &f.buyer_id,
            )
            .await
            .unwrap();

        // Catalog edits the price after the order was placed
        let rid: surrealdb::RecordId = listing.parse().unwrap();
        f.db.query("UPDATE listing SET price = $price WHERE id = $id")
            .bind(("price", dec("999.99")))
            .bind(("id", rid))
            .await
            .unwrap()
            .check()
            .unwrap();

        let reread = f
            .service
            .get_order(&dto.id, &buyer(&f))
            .await
            .unwrap();
        assert_eq!(reread.items[0].unit_price, dec("200.00"));
        assert_eq!(reread.subtotal, dec("200.00"));
    }

    #[tokio::test]
    async fn test_create_order_insufficient_stock_is_all_or_nothing() {
        let f = setup().await;
        let a = seed_listing(&f, "50.00", 10).await;
        let b = seed_listing(&f, "80.00", 1).await;

        let err = f
            .service
            .create_order(
                order_request(vec![
                    CreateOrderItemRequest {
                        listing_id: a.clone(),
                        quantity: 2,
                    },
                    CreateOrderItemRequest {
                        listing_id: b.clone(),
                        quantity: 3,
                    },
                ]),
                &f.buyer_id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { .. }));

        // No partial reservation survived
        assert_eq!(f.listings.find_by_id(&a).await.unwrap().unwrap().quantity, 10);
        assert_eq!(f.listings.find_by_id(&b).await.unwrap().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_create_order_inactive_listing() {
        let f = setup().await;
        let listing = f
            .listings
            .create(ListingCreate {
                seller_id: f.seller_id.clone(),
                title: "Discontinued Part".to_string(),
                price: dec("10.00"),
                quantity: 5,
                active: false,
            })
            .await
            .unwrap()
            .id_string();

        let err = f
            .service
            .create_order(
                order_request(vec![CreateOrderItemRequest {
                    listing_id: listing,
                    quantity: 1,
                }]),
                &f.buyer_id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ListingInactive(_)));
    }

    #[tokio::test]
    async fn test_create_order_empty_items() {
        let f = setup().await;
        let err = f
            .service
            .create_order(order_request(vec![]), &f.buyer_id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::EmptyOrder));
    }

    #[tokio::test]
    async fn test_concurrent_placement_last_unit() {
        let f = setup().await;
        let listing = seed_listing(&f, "75.00", 1).await;

        let req = |listing_id: String| {
            order_request(vec![CreateOrderItemRequest {
                listing_id,
                quantity: 1,
            }])
        };

        let (r1, r2) = tokio::join!(
            f.service.create_order(req(listing.clone()), &f.buyer_id),
            f.service.create_order(req(listing.clone()), &f.buyer_id),
        );

        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one placement may win the last unit");

        let loser = if r1.is_err() { r1 } else { r2 };
        assert!(matches!(
            loser.unwrap_err(),
            OrderError::InsufficientStock { .. }
        ));
    }

    // ========================================================================
    // State machine
    // ========================================================================

    async fn place_order(f: &Fixture, listing: &str, qty: i64) -> OrderDto {
        f.service
            .create_order(
                order_request(vec![CreateOrderItemRequest {
                    listing_id: listing.to_string(),
                    quantity: qty,
                }]),
                &f.buyer_id,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_buyer_cancel_restocks_exactly_once() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 6).await;
        let order = place_order(&f, &listing, 4).await;
        assert_eq!(f.listings.find_by_id(&listing).await.unwrap().unwrap().quantity, 2);

        let cancelled = f
            .service
            .update_status(&order.id, OrderStatus::Cancelled, &buyer(&f), None)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_date.is_some());

        // Stock restored
        assert_eq!(f.listings.find_by_id(&listing).await.unwrap().unwrap().quantity, 6);

        // Second cancel: InvalidTransition, no double release
        let err = f
            .service
            .update_status(&order.id, OrderStatus::Cancelled, &buyer(&f), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
        assert_eq!(f.listings.find_by_id(&listing).await.unwrap().unwrap().quantity, 6);
    }

    #[tokio::test]
    async fn test_same_status_is_noop() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;

        let unchanged = f
            .service
            .update_status(&order.id, OrderStatus::PendingPayment, &buyer(&f), None)
            .await
            .unwrap();
        assert_eq!(unchanged.status, OrderStatus::PendingPayment);
        assert_eq!(unchanged.updated_at, order.updated_at);
    }

    #[tokio::test]
    async fn test_buyer_may_only_cancel() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;

        let err = f
            .service
            .update_status(&order.id, OrderStatus::Shipped, &buyer(&f), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_seller_fulfilment_flow_and_timestamps() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;

        // Payment arrives via the payment-system capability
        let applied = f
            .service
            .complete_payment(&order.id, "pf-552211")
            .await
            .unwrap();
        let order = match applied {
            PaymentApplication::Applied(o) => o,
            other => panic!("expected Applied, got {other:?}"),
        };
        assert_eq!(order.status, OrderStatus::PaymentCompleted);
        assert!(order.payment_date.is_some());
        assert_eq!(order.payment_id.as_deref(), Some("pf-552211"));

        let order_id = order.id_string();
        let processing = f
            .service
            .update_status(&order_id, OrderStatus::Processing, &seller(&f), None)
            .await
            .unwrap();
        assert_eq!(processing.status, OrderStatus::Processing);

        let shipped = f
            .service
            .update_status(
                &order_id,
                OrderStatus::Shipped,
                &seller(&f),
                Some("TRACK-9001".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert!(shipped.shipped_date.is_some());
        assert_eq!(shipped.tracking_number.as_deref(), Some("TRACK-9001"));

        let delivered = f
            .service
            .update_status(&order_id, OrderStatus::Delivered, &seller(&f), None)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.delivered_date.is_some());

        // Fulfilment never moves backwards: DELIVERED -> PROCESSING fails
        let err = f
            .service
            .update_status(&order_id, OrderStatus::Processing, &seller(&f), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_unrelated_seller_cannot_touch_order() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;
        f.service.complete_payment(&order.id, "pf-1").await.unwrap();

        let stranger = Actor::Seller {
            user_id: "user:someoneelse".to_string(),
        };
        let err = f
            .service
            .update_status(&order.id, OrderStatus::Processing, &stranger, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_complete_payment_idempotent() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;

        let first = f.service.complete_payment(&order.id, "pf-1").await.unwrap();
        assert!(matches!(first, PaymentApplication::Applied(_)));

        let second = f.service.complete_payment(&order.id, "pf-1").await.unwrap();
        let PaymentApplication::AlreadyApplied(unchanged) = second else {
            panic!("expected AlreadyApplied");
        };
        assert_eq!(unchanged.payment_id.as_deref(), Some("pf-1"));
    }

    #[tokio::test]
    async fn test_complete_payment_on_cancelled_order_is_closed() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;

        f.service
            .update_status(&order.id, OrderStatus::Cancelled, &buyer(&f), None)
            .await
            .unwrap();

        let outcome = f.service.complete_payment(&order.id, "pf-1").await.unwrap();
        assert!(matches!(
            outcome,
            PaymentApplication::Closed(OrderStatus::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_get_order_visibility() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 3).await;
        let order = place_order(&f, &listing, 1).await;

        assert!(f.service.get_order(&order.id, &buyer(&f)).await.is_ok());
        assert!(f.service.get_order(&order.id, &seller(&f)).await.is_ok());

        let other_buyer = Actor::Buyer {
            user_id: "user:other".to_string(),
        };
        let err = f
            .service
            .get_order(&order.id, &other_buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Unauthorized(_)));

        let admin = Actor::Admin {
            user_id: "user:admin".to_string(),
        };
        assert!(f.service.get_order(&order.id, &admin).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_for_buyer_and_seller() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 10).await;
        place_order(&f, &listing, 1).await;
        place_order(&f, &listing, 2).await;

        let mine = f
            .service
            .list_for_buyer(&f.buyer_id, None, 50, 0)
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);

        let sold = f
            .service
            .list_for_seller(&f.seller_id, None, 50, 0)
            .await
            .unwrap();
        assert_eq!(sold.len(), 2);

        let pending = f
            .service
            .list_for_buyer(&f.buyer_id, Some(OrderStatus::PendingPayment), 50, 0)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let cancelled = f
            .service
            .list_for_buyer(&f.buyer_id, Some(OrderStatus::Cancelled), 50, 0)
            .await
            .unwrap();
        assert!(cancelled.is_empty());
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    #[tokio::test]
    async fn test_expire_pending_cancels_and_restocks() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 5).await;
        let order = place_order(&f, &listing, 2).await;
        assert_eq!(f.listings.find_by_id(&listing).await.unwrap().unwrap().quantity, 3);

        // Cutoff in the future: every pending order qualifies
        let cutoff = shared::util::now_millis() + 60_000;
        let expired = f.service.expire_pending(&order.id, cutoff).await.unwrap();
        assert!(expired);

        let reread = f
            .service
            .get_order(&order.id, &buyer(&f))
            .await
            .unwrap();
        assert_eq!(reread.status, OrderStatus::Cancelled);
        assert_eq!(f.listings.find_by_id(&listing).await.unwrap().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_expire_pending_skips_paid_orders() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 5).await;
        let order = place_order(&f, &listing, 2).await;
        f.service.complete_payment(&order.id, "pf-1").await.unwrap();

        let cutoff = shared::util::now_millis() + 60_000;
        let expired = f.service.expire_pending(&order.id, cutoff).await.unwrap();
        assert!(!expired);

        let reread = f
            .service
            .get_order(&order.id, &buyer(&f))
            .await
            .unwrap();
        assert_eq!(reread.status, OrderStatus::PaymentCompleted);
    }

    #[tokio::test]
    async fn test_expire_pending_respects_cutoff() {
        let f = setup().await;
        let listing = seed_listing(&f, "40.00", 5).await;
        let order = place_order(&f, &listing, 2).await;

        // Cutoff in the past: the freshly created order is too young
        let cutoff = shared::util::now_millis() - 60_000;
        let expired = f.service.expire_pending(&order.id, cutoff).await.unwrap();
        assert!(!expired);
    }
}

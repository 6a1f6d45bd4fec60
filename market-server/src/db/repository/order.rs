//! Order Repository
//!
//! Order + OrderItem 的持久化。创建在单个事务中写入订单与全部行项；
//! 状态流转使用针对性 UPDATE，时间戳字段只在对应流转时写入一次。
//! 订单从不物理删除 (审计保留)。

use super::{BaseRepository, RepoError, RepoResult};
use crate::db::models::{Order, OrderItem};
use shared::order::OrderStatus;
use surrealdb::engine::local::Db;
use surrealdb::{RecordId, Surreal};

#[derive(Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Parse and check a full "order:id" string
    fn parse_id(order_id: &str) -> RepoResult<RecordId> {
        let rid: RecordId = order_id
            .parse()
            .map_err(|_| RepoError::Validation(format!("invalid order id: {order_id}")))?;
        if rid.table() != "order" {
            return Err(RepoError::Validation(format!(
                "invalid order id: {order_id}"
            )));
        }
        Ok(rid)
    }

    /// Persist an order and all of its items in a single transaction.
    ///
    /// `order_key` is the pre-generated record key; every item's
    /// `order_id` must already reference `order:<order_key>`.
    pub async fn create_with_items(
        &self,
        order_key: &str,
        order: &Order,
        items: &[OrderItem],
    ) -> RepoResult<()> {
        let mut sql = String::from(
            "BEGIN TRANSACTION;\nCREATE type::thing('order', $order_key) CONTENT $order;\n",
        );
        for i in 0..items.len() {
            sql.push_str(&format!(
                "CREATE type::thing('order_item', $item_key{i}) CONTENT $item{i};\n"
            ));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self
            .base
            .db()
            .query(sql)
            .bind(("order_key", order_key.to_string()))
            .bind(("order", order.clone()));

        for (i, item) in items.iter().enumerate() {
            let item_key = uuid::Uuid::new_v4().simple().to_string();
            query = query
                .bind((format!("item_key{i}"), item_key))
                .bind((format!("item{i}"), item.clone()));
        }

        query.await?.check()?;
        Ok(())
    }

    /// Find an order by full "order:id" string
    pub async fn find_by_id(&self, order_id: &str) -> RepoResult<Option<Order>> {
        let rid = Self::parse_id(order_id)?;
        let order: Option<Order> = self.base.db().select(rid).await?;
        Ok(order)
    }

    /// All items of an order
    pub async fn items_for(&self, order_id: &str) -> RepoResult<Vec<OrderItem>> {
        let items: Vec<OrderItem> = self
            .base
            .db()
            .query("SELECT * FROM order_item WHERE order_id = $order_id")
            .bind(("order_id", order_id.to_string()))
            .await?
            .take(0)?;
        Ok(items)
    }

    /// Order together with its items
    pub async fn find_with_items(
        &self,
        order_id: &str,
    ) -> RepoResult<Option<(Order, Vec<OrderItem>)>> {
        let Some(order) = self.find_by_id(order_id).await? else {
            return Ok(None);
        };
        let items = self.items_for(order_id).await?;
        Ok(Some((order, items)))
    }

    /// Orders placed by a buyer, newest first
    pub async fn list_by_buyer(
        &self,
        buyer_id: &str,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Order>> {
        let mut sql =
            String::from("SELECT * FROM order WHERE buyer_id = $buyer_id");
        if status.is_some() {
            sql.push_str(" AND status = $status");
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {} START {}",
            limit.max(1),
            offset.max(0)
        ));

        let mut query = self
            .base
            .db()
            .query(sql)
            .bind(("buyer_id", buyer_id.to_string()));
        if let Some(status) = status {
            query = query.bind(("status", status));
        }

        let orders: Vec<Order> = query.await?.take(0)?;
        Ok(orders)
    }

    /// Orders containing at least one item of the given seller, newest first
    pub async fn list_by_seller(
        &self,
        seller_id: &str,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Order>> {
        let mut sql = String::from(
            "SELECT * FROM order WHERE <string>id INSIDE \
             (SELECT VALUE order_id FROM order_item WHERE seller_id = $seller_id)",
        );
        if status.is_some() {
            sql.push_str(" AND status = $status");
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {} START {}",
            limit.max(1),
            offset.max(0)
        ));

        let mut query = self
            .base
            .db()
            .query(sql)
            .bind(("seller_id", seller_id.to_string()));
        if let Some(status) = status {
            query = query.bind(("status", status));
        }

        let orders: Vec<Order> = query.await?.take(0)?;
        Ok(orders)
    }

    /// Apply a status transition: set the status, stamp the matching
    /// timestamp field (if any) and optionally the tracking number.
    pub async fn apply_transition(
        &self,
        order_id: &str,
        status: OrderStatus,
        tracking_number: Option<String>,
        now: i64,
    ) -> RepoResult<Order> {
        let rid = Self::parse_id(order_id)?;

        let mut sql = String::from("UPDATE order SET status = $status, updated_at = $now");
        // Stamp fields are a fixed whitelist keyed by the target status
        match status {
            OrderStatus::PaymentCompleted => sql.push_str(", payment_date = $now"),
            OrderStatus::Shipped => sql.push_str(", shipped_date = $now"),
            OrderStatus::Delivered => sql.push_str(", delivered_date = $now"),
            OrderStatus::Cancelled => sql.push_str(", cancelled_date = $now"),
            _ => {}
        }
        if tracking_number.is_some() {
            sql.push_str(", tracking_number = $tracking");
        }
        sql.push_str(" WHERE id = $id RETURN AFTER");

        let mut query = self
            .base
            .db()
            .query(sql)
            .bind(("status", status))
            .bind(("now", now))
            .bind(("id", rid));
        if let Some(tracking) = tracking_number {
            query = query.bind(("tracking", tracking));
        }

        let orders: Vec<Order> = query.await?.check()?.take(0)?;
        orders
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound(format!("Order {order_id} not found")))
    }

    /// Payment confirmed: status, payment timestamp and gateway reference
    /// set in one update.
    pub async fn mark_paid(
        &self,
        order_id: &str,
        payment_reference: &str,
        now: i64,
    ) -> RepoResult<Order> {
        let rid = Self::parse_id(order_id)?;

        let orders: Vec<Order> = self
            .base
            .db()
            .query(
                "UPDATE order SET status = $status, payment_date = $now, \
                 payment_id = $payment_id, updated_at = $now WHERE id = $id RETURN AFTER",
            )
            .bind(("status", OrderStatus::PaymentCompleted))
            .bind(("now", now))
            .bind(("payment_id", payment_reference.to_string()))
            .bind(("id", rid))
            .await?
            .check()?
            .take(0)?;

        orders
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound(format!("Order {order_id} not found")))
    }

    /// Pending-payment orders created before the cutoff (expiry reaper)
    pub async fn list_expired_pending(&self, cutoff_millis: i64) -> RepoResult<Vec<Order>> {
        let orders: Vec<Order> = self
            .base
            .db()
            .query("SELECT * FROM order WHERE status = $status AND created_at < $cutoff")
            .bind(("status", OrderStatus::PendingPayment))
            .bind(("cutoff", cutoff_millis))
            .await?
            .take(0)?;
        Ok(orders)
    }
}

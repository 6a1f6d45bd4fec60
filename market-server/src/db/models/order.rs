//! Order Model
//!
//! Order 是聚合根；OrderItem 由订单独占，下单时一并创建，价格为下单
//! 时刻的快照，之后目录价格变动不影响历史订单。订单从不物理删除。

use super::serde_helpers;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::order::OrderStatus;
use surrealdb::RecordId;
use validator::Validate;

// =============================================================================
// Order (aggregate root)
// =============================================================================

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(
        default,
        with = "serde_helpers::option_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,
    pub buyer_id: String,
    pub status: OrderStatus,

    // Monetary fields: total = subtotal + shipping_fee + tax_amount
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,

    // Shipping / contact
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_province: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub tracking_number: Option<String>,

    /// Gateway payment reference, set once when payment is confirmed
    pub payment_id: Option<String>,

    // Status timestamps, each stamped exactly once
    pub payment_date: Option<i64>,
    pub shipped_date: Option<i64>,
    pub delivered_date: Option<i64>,
    pub cancelled_date: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Full "table:id" string
    pub fn id_string(&self) -> String {
        self.id.as_ref().map(|id| id.to_string()).unwrap_or_default()
    }
}

// =============================================================================
// Order Item (owned by one order)
// =============================================================================

/// Order line item — immutable price snapshot taken at order time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(
        default,
        with = "serde_helpers::option_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,
    pub order_id: String,
    pub listing_id: String,
    pub seller_id: String,
    pub listing_title: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub created_at: i64,
}

// =============================================================================
// API Request Types
// =============================================================================

/// One requested line of a new order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderItemRequest {
    #[validate(length(min = 1, message = "listing id is required"))]
    pub listing_id: String,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i64,
}

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    #[validate(nested)]
    pub items: Vec<CreateOrderItemRequest>,
    #[validate(length(min = 1))]
    pub shipping_address: String,
    #[validate(length(min = 1))]
    pub shipping_city: String,
    #[validate(length(min = 1))]
    pub shipping_postal_code: String,
    #[validate(length(min = 1))]
    pub shipping_province: String,
    pub contact_phone: String,
    #[validate(email)]
    pub contact_email: String,
}

/// Update order status payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

// =============================================================================
// API Response Types
// =============================================================================

/// Order line item for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemDto {
    pub id: String,
    pub listing_id: String,
    pub seller_id: String,
    pub listing_title: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Full order for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDto {
    pub id: String,
    pub buyer_id: String,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_province: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub tracking_number: Option<String>,
    pub payment_id: Option<String>,
    pub payment_date: Option<i64>,
    pub shipped_date: Option<i64>,
    pub delivered_date: Option<i64>,
    pub cancelled_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub items: Vec<OrderItemDto>,
}

impl OrderDto {
    /// Assemble the response shape from an order and its items
    pub fn from_parts(order: Order, items: Vec<OrderItem>) -> Self {
        let items = items
            .into_iter()
            .map(|item| OrderItemDto {
                id: item
                    .id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                listing_id: item.listing_id,
                seller_id: item.seller_id,
                listing_title: item.listing_title,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect();

        Self {
            id: order.id_string(),
            buyer_id: order.buyer_id,
            status: order.status,
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            tax_amount: order.tax_amount,
            total: order.total,
            shipping_address: order.shipping_address,
            shipping_city: order.shipping_city,
            shipping_postal_code: order.shipping_postal_code,
            shipping_province: order.shipping_province,
            contact_phone: order.contact_phone,
            contact_email: order.contact_email,
            tracking_number: order.tracking_number,
            payment_id: order.payment_id,
            payment_date: order.payment_date,
            shipped_date: order.shipped_date,
            delivered_date: order.delivered_date,
            cancelled_date: order.cancelled_date,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items,
        }
    }
}

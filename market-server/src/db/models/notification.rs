//! Notification Model
//!
//! 通知只落库，投递由外部协作方负责。落库失败绝不回滚触发它的事务。

use super::serde_helpers;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

/// Notification category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    OrderCreated,
    OrderStatusUpdated,
    PaymentSuccessful,
    ListingSold,
}

/// Notification entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(
        default,
        with = "serde_helpers::option_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Referenced entity (usually an order id)
    pub reference_id: Option<String>,
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: i64,
}

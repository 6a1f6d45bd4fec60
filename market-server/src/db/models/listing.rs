//! Listing Model
//!
//! 目录数据由外部协作方维护；本服务只读取价格/状态并修改 quantity
//! (库存台账)。quantity 永不为负，由原子条件更新保证。

use super::serde_helpers;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

/// Listing entity (catalog item with live inventory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    #[serde(
        default,
        with = "serde_helpers::option_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,
    pub seller_id: String,
    pub title: String,
    /// Current unit price; orders snapshot this at placement time
    pub price: Decimal,
    /// Available quantity (never negative)
    pub quantity: i64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Listing {
    pub fn id_string(&self) -> String {
        self.id.as_ref().map(|id| id.to_string()).unwrap_or_default()
    }
}

/// Create listing payload (seeding and tests)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCreate {
    pub seller_id: String,
    pub title: String,
    pub price: Decimal,
    pub quantity: i64,
    pub active: bool,
}

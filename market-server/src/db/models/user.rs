//! User Model
//!
//! 用户/卖家资料由外部协作方维护，这里只保留订单和支付需要的字段。

use super::serde_helpers;
use serde::{Deserialize, Serialize};
use shared::order::Role;
use surrealdb::RecordId;

/// User entity (buyer or seller)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(
        default,
        with = "serde_helpers::option_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub created_at: i64,
}

impl User {
    /// Full "table:id" string
    pub fn id_string(&self) -> String {
        self.id.as_ref().map(|id| id.to_string()).unwrap_or_default()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Create user payload (seeding and tests)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

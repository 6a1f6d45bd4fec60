//! Listing Repository
//!
//! 目录协作方接口：查找与创建。库存数量的修改只允许通过
//! `orders::inventory::InventoryLedger` 的原子更新进行。

use super::{BaseRepository, RepoError, RepoResult};
use crate::db::models::{Listing, ListingCreate};
use surrealdb::engine::local::Db;
use surrealdb::{RecordId, Surreal};

#[derive(Clone)]
pub struct ListingRepository {
    base: BaseRepository,
}

impl ListingRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find a listing by full "listing:id" string
    pub async fn find_by_id(&self, listing_id: &str) -> RepoResult<Option<Listing>> {
        let rid: RecordId = listing_id
            .parse()
            .map_err(|_| RepoError::Validation(format!("invalid listing id: {listing_id}")))?;
        if rid.table() != "listing" {
            return Err(RepoError::Validation(format!(
                "invalid listing id: {listing_id}"
            )));
        }

        let listing: Option<Listing> = self.base.db().select(rid).await?;
        Ok(listing)
    }

    /// Create a listing (seeding and tests)
    pub async fn create(&self, data: ListingCreate) -> RepoResult<Listing> {
        let key = uuid::Uuid::new_v4().simple().to_string();
        let now = shared::util::now_millis();
        let mut row = Listing {
            id: None,
            seller_id: data.seller_id,
            title: data.title,
            price: data.price,
            quantity: data.quantity,
            active: data.active,
            created_at: now,
            updated_at: now,
        };

        self.base
            .db()
            .query("CREATE type::thing('listing', $key) CONTENT $data")
            .bind(("key", key.clone()))
            .bind(("data", row.clone()))
            .await?
            .check()?;

        row.id = Some(RecordId::from_table_key("listing", key));
        Ok(row)
    }
}

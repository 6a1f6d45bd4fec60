//! Inventory Ledger
//!
//! Owns the available quantity on listings. `reserve` is a single atomic
//! conditional update per listing — check-then-decrement can never race:
//!
//! ```sql
//! UPDATE listing SET quantity -= $qty
//! WHERE id = $id AND quantity >= $qty AND active = true
//! ```
//!
//! Two concurrent reservations on the same listing serialize at the
//! storage layer; the losing transaction either observes the reduced
//! quantity or retries on a commit conflict. Releases must be paired
//! exactly once per reservation by the caller — the ledger does not
//! deduplicate release calls.

use crate::db::models::Listing;
use crate::db::repository::{RepoError, is_commit_conflict};
use surrealdb::engine::local::Db;
use surrealdb::{RecordId, Surreal};
use thiserror::Error;
use tracing::{error, warn};

/// 提交冲突重试次数
const MAX_RETRIES: u32 = 3;

/// Ledger operation failure
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("listing not found: {0}")]
    NotFound(String),

    #[error("listing is not active: {0}")]
    Inactive(String),

    #[error("insufficient stock for {listing_id}: requested {requested}, available {available}")]
    InsufficientStock {
        listing_id: String,
        requested: i64,
        available: i64,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RepoError> for LedgerError {
    fn from(e: RepoError) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

/// Per-listing inventory ledger
#[derive(Clone)]
pub struct InventoryLedger {
    db: Surreal<Db>,
}

impl InventoryLedger {
    pub fn new(db: Surreal<Db>) -> Self {
        Self { db }
    }

    fn parse_id(listing_id: &str) -> Result<RecordId, LedgerError> {
        let rid: RecordId = listing_id
            .parse()
            .map_err(|_| LedgerError::NotFound(listing_id.to_string()))?;
        if rid.table() != "listing" {
            return Err(LedgerError::NotFound(listing_id.to_string()));
        }
        Ok(rid)
    }

    /// Reserve `qty` units of a listing.
    ///
    /// The decrement only commits when the listing is active and has at
    /// least `qty` units left; otherwise the update matches nothing and
    /// the precise failure reason is read back separately.
    pub async fn reserve(&self, listing_id: &str, qty: i64) -> Result<(), LedgerError> {
        let rid = Self::parse_id(listing_id)?;
        let now = shared::util::now_millis();

        let mut attempt = 0;
        loop {
            let result = self
                .db
                .query(
                    "UPDATE listing SET quantity -= $qty, updated_at = $now \
                     WHERE id = $id AND quantity >= $qty AND active = true RETURN AFTER",
                )
                .bind(("qty", qty))
                .bind(("now", now))
                .bind(("id", rid.clone()))
                .await
                .and_then(|r| r.check());

            match result {
                Ok(mut response) => {
                    let rows: Vec<Listing> = response
                        .take(0)
                        .map_err(|e| LedgerError::Storage(e.to_string()))?;
                    if rows.is_empty() {
                        return Err(self.classify_failure(rid, qty).await);
                    }
                    return Ok(());
                }
                Err(e) if is_commit_conflict(&e) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(
                        listing_id = %listing_id,
                        attempt,
                        "inventory reserve hit commit conflict, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(5 * attempt as u64)).await;
                }
                Err(e) => return Err(LedgerError::Storage(e.to_string())),
            }
        }
    }

    /// The conditional update matched nothing: read the listing to
    /// report why.
    async fn classify_failure(&self, rid: RecordId, qty: i64) -> LedgerError {
        let listing_id = rid.to_string();
        let listing: Result<Option<Listing>, _> = self.db.select(rid).await;
        match listing {
            Ok(None) => LedgerError::NotFound(listing_id),
            Ok(Some(listing)) if !listing.active => LedgerError::Inactive(listing.title),
            Ok(Some(listing)) => LedgerError::InsufficientStock {
                listing_id,
                requested: qty,
                available: listing.quantity,
            },
            Err(e) => LedgerError::Storage(e.to_string()),
        }
    }

    /// Return `qty` units of a listing to stock.
    ///
    /// Callers release exactly once per reservation they made.
    pub async fn release(&self, listing_id: &str, qty: i64) -> Result<(), LedgerError> {
        let rid = Self::parse_id(listing_id)?;
        let now = shared::util::now_millis();

        let mut attempt = 0;
        loop {
            let result = self
                .db
                .query(
                    "UPDATE listing SET quantity += $qty, updated_at = $now \
                     WHERE id = $id RETURN AFTER",
                )
                .bind(("qty", qty))
                .bind(("now", now))
                .bind(("id", rid.clone()))
                .await
                .and_then(|r| r.check());

            match result {
                Ok(mut response) => {
                    let rows: Vec<Listing> = response
                        .take(0)
                        .map_err(|e| LedgerError::Storage(e.to_string()))?;
                    if rows.is_empty() {
                        return Err(LedgerError::NotFound(listing_id.to_string()));
                    }
                    return Ok(());
                }
                Err(e) if is_commit_conflict(&e) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(
                        listing_id = %listing_id,
                        attempt,
                        "inventory release hit commit conflict, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(5 * attempt as u64)).await;
                }
                Err(e) => return Err(LedgerError::Storage(e.to_string())),
            }
        }
    }

    /// Reserve every (listing, qty) pair of one placement request.
    ///
    /// On the first failure all reservations already made *by this
    /// request* are rolled back, so a failed placement leaves inventory
    /// unchanged for every item.
    pub async fn reserve_all(&self, wants: &[(String, i64)]) -> Result<(), LedgerError> {
        for (index, (listing_id, qty)) in wants.iter().enumerate() {
            if let Err(e) = self.reserve(listing_id, *qty).await {
                self.release_all(&wants[..index]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Release every (listing, qty) pair, logging failures.
    ///
    /// Used for cancellation restock and placement rollback. A failed
    /// release is surfaced in the log for manual reconciliation; the
    /// remaining items are still released.
    pub async fn release_all(&self, reserved: &[(String, i64)]) {
        for (listing_id, qty) in reserved {
            if let Err(e) = self.release(listing_id, *qty).await {
                error!(
                    listing_id = %listing_id,
                    qty,
                    error = %e,
                    "failed to release reserved stock, manual reconciliation required"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::models::ListingCreate;
    use crate::db::repository::ListingRepository;
    use rust_decimal::Decimal;

    async fn setup() -> (InventoryLedger, ListingRepository) {
        let db = DbService::memory().await.unwrap().db;
        (InventoryLedger::new(db.clone()), ListingRepository::new(db))
    }

    async fn seed_listing(repo: &ListingRepository, quantity: i64, active: bool) -> String {
        repo.create(ListingCreate {
            seller_id: "user:seller1".to_string(),
            title: "Brake Pad Set".to_string(),
            price: Decimal::new(49999, 2),
            quantity,
            active,
        })
        .await
        .unwrap()
        .id_string()
    }

    #[tokio::test]
    async fn test_reserve_decrements_stock() {
        let (ledger, listings) = setup().await;
        let id = seed_listing(&listings, 10, true).await;

        ledger.reserve(&id, 3).await.unwrap();

        let listing = listings.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(listing.quantity, 7);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_stock() {
        let (ledger, listings) = setup().await;
        let id = seed_listing(&listings, 2, true).await;

        let err = ledger.reserve(&id, 5).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock {
                requested: 5,
                available: 2,
                ..
            }
        ));

        // Stock unchanged
        let listing = listings.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(listing.quantity, 2);
    }

    #[tokio::test]
    async fn test_reserve_inactive_listing() {
        let (ledger, listings) = setup().await;
        let id = seed_listing(&listings, 10, false).await;

        let err = ledger.reserve(&id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::Inactive(_)));
    }

    #[tokio::test]
    async fn test_reserve_missing_listing() {
        let (ledger, _) = setup().await;
        let err = ledger.reserve("listing:doesnotexist", 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_release_restores_stock() {
        let (ledger, listings) = setup().await;
        let id = seed_listing(&listings, 5, true).await;

        ledger.reserve(&id, 5).await.unwrap();
        ledger.release(&id, 5).await.unwrap();

        let listing = listings.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(listing.quantity, 5);
    }

    #[tokio::test]
    async fn test_reserve_all_rolls_back_on_failure() {
        let (ledger, listings) = setup().await;
        let a = seed_listing(&listings, 10, true).await;
        let b = seed_listing(&listings, 1, true).await;

        let wants = vec![(a.clone(), 4), (b.clone(), 3)];
        let err = ledger.reserve_all(&wants).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));

        // Neither listing lost stock
        assert_eq!(listings.find_by_id(&a).await.unwrap().unwrap().quantity, 10);
        assert_eq!(listings.find_by_id(&b).await.unwrap().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reserve_last_unit() {
        let (ledger, listings) = setup().await;
        let id = seed_listing(&listings, 1, true).await;

        // Two simultaneous requests for the last unit: exactly one wins
        let (r1, r2) = tokio::join!(ledger.reserve(&id, 1), ledger.reserve(&id, 1));

        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one reservation must succeed");

        let failure = if r1.is_err() { r1 } else { r2 };
        assert!(matches!(
            failure.unwrap_err(),
            LedgerError::InsufficientStock { .. }
        ));

        let listing = listings.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(listing.quantity, 0);
    }
}

//! Database Module
//!
//! Embedded SurrealDB: connection bootstrap, schema/index definitions,
//! models and repositories.

pub mod models;
pub mod repository;

use crate::utils::AppError;
use surrealdb::Surreal;
use surrealdb::engine::local::Db;

const NAMESPACE: &str = "partsmarket";
const DATABASE: &str = "market";

/// Database service — owns the embedded SurrealDB handle
#[derive(Clone)]
pub struct DbService {
    pub db: Surreal<Db>,
}

impl DbService {
    /// Open the RocksDB-backed database at the given path and apply schema
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        let db = Surreal::new::<surrealdb::engine::local::RocksDb>(db_path)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| AppError::database(format!("Failed to select namespace: {e}")))?;

        define_schema(&db).await?;

        tracing::info!(path = %db_path, "Database connection established");
        Ok(Self { db })
    }

    /// In-memory database for tests
    pub async fn memory() -> Result<Self, AppError> {
        let db = Surreal::new::<surrealdb::engine::local::Mem>(())
            .await
            .map_err(|e| AppError::database(format!("Failed to open in-memory database: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| AppError::database(format!("Failed to select namespace: {e}")))?;

        define_schema(&db).await?;
        Ok(Self { db })
    }
}

/// Apply table and index definitions (idempotent)
async fn define_schema(db: &Surreal<Db>) -> Result<(), AppError> {
    db.query(
        r#"
        DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
        DEFINE TABLE IF NOT EXISTS listing SCHEMALESS;
        DEFINE TABLE IF NOT EXISTS order SCHEMALESS;
        DEFINE TABLE IF NOT EXISTS order_item SCHEMALESS;
        DEFINE TABLE IF NOT EXISTS notification SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS order_buyer ON TABLE order COLUMNS buyer_id;
        DEFINE INDEX IF NOT EXISTS order_status ON TABLE order COLUMNS status;
        DEFINE INDEX IF NOT EXISTS order_item_order ON TABLE order_item COLUMNS order_id;
        DEFINE INDEX IF NOT EXISTS order_item_seller ON TABLE order_item COLUMNS seller_id;
        DEFINE INDEX IF NOT EXISTS notification_recipient ON TABLE notification COLUMNS recipient_id;
        "#,
    )
    .await
    .map_err(|e| AppError::database(format!("Failed to define schema: {e}")))?
    .check()
    .map_err(|e| AppError::database(format!("Failed to define schema: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ListingCreate, UserCreate};
    use crate::db::repository::{ListingRepository, UserRepository};
    use rust_decimal::Decimal;
    use shared::order::Role;

    #[tokio::test]
    async fn test_rocksdb_open_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.db");

        // First session: every handle must drop before reopening, or the
        // storage lock is still held
        let user_id = {
            let service = DbService::new(&path.to_string_lossy()).await.unwrap();

            let users = UserRepository::new(service.db.clone());
            let user = users
                .create(UserCreate {
                    first_name: "Thandi".to_string(),
                    last_name: "Ngwenya".to_string(),
                    email: "thandi@example.com".to_string(),
                    role: Role::Buyer,
                })
                .await
                .unwrap();

            let found = users.find_by_id(&user.id_string()).await.unwrap().unwrap();
            assert_eq!(found.email, "thandi@example.com");
            assert_eq!(found.role, Role::Buyer);

            let listings = ListingRepository::new(service.db.clone());
            let listing = listings
                .create(ListingCreate {
                    seller_id: user.id_string(),
                    title: "Spark Plug".to_string(),
                    price: Decimal::new(2500, 2),
                    quantity: 12,
                    active: true,
                })
                .await
                .unwrap();

            let found = listings
                .find_by_id(&listing.id_string())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.quantity, 12);
            assert_eq!(found.price, Decimal::new(2500, 2));

            user.id_string()
        };

        // Schema definitions are idempotent on reopen, data survives
        let reopened = DbService::new(&path.to_string_lossy()).await.unwrap();
        let users = UserRepository::new(reopened.db.clone());
        let still_there = users.find_by_id(&user_id).await.unwrap();
        assert!(still_there.is_some());
    }
}

//! Notification Repository

use super::{BaseRepository, RepoResult};
use crate::db::models::{Notification, NotificationKind};
use surrealdb::engine::local::Db;
use surrealdb::{RecordId, Surreal};

#[derive(Clone)]
pub struct NotificationRepository {
    base: BaseRepository,
}

impl NotificationRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Persist one notification
    pub async fn create(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
        reference_id: Option<String>,
        link: Option<String>,
    ) -> RepoResult<Notification> {
        let key = uuid::Uuid::new_v4().simple().to_string();
        let mut row = Notification {
            id: None,
            recipient_id: recipient_id.to_string(),
            kind,
            title: title.to_string(),
            body: body.to_string(),
            reference_id,
            link,
            read: false,
            created_at: shared::util::now_millis(),
        };

        self.base
            .db()
            .query("CREATE type::thing('notification', $key) CONTENT $data")
            .bind(("key", key.clone()))
            .bind(("data", row.clone()))
            .await?
            .check()?;

        row.id = Some(RecordId::from_table_key("notification", key));
        Ok(row)
    }

    /// Notifications for one recipient, newest first
    pub async fn list_by_recipient(&self, recipient_id: &str) -> RepoResult<Vec<Notification>> {
        let rows: Vec<Notification> = self
            .base
            .db()
            .query(
                "SELECT * FROM notification WHERE recipient_id = $recipient_id \
                 ORDER BY created_at DESC",
            )
            .bind(("recipient_id", recipient_id.to_string()))
            .await?
            .take(0)?;
        Ok(rows)
    }
}

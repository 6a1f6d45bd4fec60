//! User Repository
//!
//! 只读为主：用户资料的维护属于外部协作方，这里提供订单与支付流程
//! 需要的查找，以及测试/初始化用的创建。

use super::{BaseRepository, RepoError, RepoResult};
use crate::db::models::{User, UserCreate};
use surrealdb::engine::local::Db;
use surrealdb::{RecordId, Surreal};

#[derive(Clone)]
pub struct UserRepository {
    base: BaseRepository,
}

impl UserRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find a user by full "user:id" string
    pub async fn find_by_id(&self, user_id: &str) -> RepoResult<Option<User>> {
        let rid: RecordId = user_id
            .parse()
            .map_err(|_| RepoError::Validation(format!("invalid user id: {user_id}")))?;
        if rid.table() != "user" {
            return Err(RepoError::Validation(format!("invalid user id: {user_id}")));
        }

        let user: Option<User> = self.base.db().select(rid).await?;
        Ok(user)
    }

    /// Create a user (seeding and tests)
    pub async fn create(&self, data: UserCreate) -> RepoResult<User> {
        let key = uuid::Uuid::new_v4().simple().to_string();
        // id stays None in the content; the record id comes from the key
        let mut row = User {
            id: None,
            first_name: data.first_name,
            last_name: data.last_name,
            email: data.email,
            role: data.role,
            created_at: shared::util::now_millis(),
        };

        self.base
            .db()
            .query("CREATE type::thing('user', $key) CONTENT $data")
            .bind(("key", key.clone()))
            .bind(("data", row.clone()))
            .await?
            .check()?;

        row.id = Some(RecordId::from_table_key("user", key));
        Ok(row)
    }
}

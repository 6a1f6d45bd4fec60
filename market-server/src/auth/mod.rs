//! Request identity
//!
//! Session issuance and verification live in the upstream authentication
//! proxy; it injects the authenticated identity as trusted headers.
//! This module parses them into a [`CurrentUser`] and maps it to a
//! domain [`Actor`]. A request identity can never become the internal
//! payment-system actor.

use axum::{extract::FromRequestParts, http::request::Parts};

use shared::order::{Actor, Role};

use crate::core::ServerState;
use crate::utils::AppError;

/// 上游网关注入的身份头
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// 当前用户上下文 (从身份头解析)
///
/// # 示例
///
/// ```ignore
/// async fn handler(user: CurrentUser) -> AppResult<Json<()>> {
///     let actor = user.actor();
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// 用户 ID ("user:..." 格式)
    pub id: String,
    /// 角色
    pub role: Role,
}

impl CurrentUser {
    /// Domain actor for state machine authority checks
    pub fn actor(&self) -> Actor {
        Actor::from_role(self.role, self.id.clone())
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl FromRequestParts<ServerState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        // Check if already extracted earlier in the request
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let Some(id) = header(USER_ID_HEADER) else {
            return Err(AppError::unauthorized());
        };
        let Some(role_raw) = header(USER_ROLE_HEADER) else {
            return Err(AppError::unauthorized());
        };
        let role: Role = role_raw
            .parse()
            .map_err(|_| AppError::invalid(format!("Unknown role: {role_raw}")))?;

        let user = CurrentUser { id, role };
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

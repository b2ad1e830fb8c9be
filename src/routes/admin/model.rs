use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::routes::user::model::{Role, User};

/// `Stop` 由结束支持会话的外部调用方负责记录；核心只签发start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "impersonation_action", rename_all = "lowercase")]
pub enum ImpersonationAction {
    Start,
    Stop,
}

/// 只追加的审计记录，核心不改不删
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationLog {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub target_user_id: Uuid,
    pub action: ImpersonationAction,
    pub created_at: DateTime<Utc>,
}

impl ImpersonationLog {
    pub async fn record(
        pool: &PgPool,
        admin_id: Uuid,
        target_user_id: Uuid,
        action: ImpersonationAction,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ImpersonationLog>(
            r#"
            INSERT INTO impersonation_logs (admin_id, target_user_id, action)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(admin_id)
        .bind(target_user_id)
        .bind(action)
        .fetch_one(pool)
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_blocked: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonateResponse {
    pub impersonation_token: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(ImpersonationAction::Start).unwrap(),
            "start"
        );
        assert_eq!(
            serde_json::to_value(ImpersonationAction::Stop).unwrap(),
            "stop"
        );
    }

    #[test]
    fn update_request_fields_are_optional() {
        let req: AdminUpdateUserRequest = serde_json::from_str("{}").unwrap();
        assert!(req.role.is_none());
        assert!(req.is_blocked.is_none());

        let req: AdminUpdateUserRequest =
            serde_json::from_str(r#"{"role":"admin","isBlocked":true}"#).unwrap();
        assert_eq!(req.role, Some(Role::Admin));
        assert_eq!(req.is_blocked, Some(true));
    }
}

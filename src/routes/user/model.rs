use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::{generate_reset_token, verify_password};

/// 封闭的角色枚举；所有鉴权点都做穷举匹配，新增角色时编译器会逐个报出来
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub profile_picture: String,
    pub phone: String,
    pub bio: String,
    pub is_blocked: bool,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

impl User {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        email: &str,
        password_hash: Option<&str>,
        profile_picture: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, profile_picture)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(profile_picture)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// 覆盖写入即作废此前签发的所有刷新令牌（单活跃会话）
    pub async fn set_refresh_token(
        pool: &PgPool,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn clear_refresh_token_by_value(
        pool: &PgPool,
        token: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET refresh_token = NULL, updated_at = now() WHERE refresh_token = $1",
        )
        .bind(token)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn admin_update(
        pool: &PgPool,
        id: Uuid,
        role: Option<Role>,
        is_blocked: Option<bool>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET role = COALESCE($2, role),
                is_blocked = COALESCE($3, is_blocked),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(role)
        .bind(is_blocked)
        .fetch_optional(pool)
        .await
    }

    pub async fn verify_login(&self, password: String) -> Result<bool, AppError> {
        match &self.password_hash {
            Some(hash) => verify_password(password, hash.clone()).await,
            None => Ok(false),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ResetTicket {
    pub id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ResetTicket {
    /// 签发新票据，同一事务里作废该邮箱的全部旧票据
    pub async fn issue(pool: &PgPool, email: &str, ttl_secs: i64) -> Result<Self, sqlx::Error> {
        let token = generate_reset_token();
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs);

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        let ticket = sqlx::query_as::<_, ResetTicket>(
            r#"
            INSERT INTO password_resets (email, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(&token)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ticket)
    }

    /// 过期票据永远匹配不到；被动回收
    pub async fn find_valid(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ResetTicket>(
            "SELECT * FROM password_resets WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(pool)
        .await
    }

    /// 写入新密码并删除票据，单事务。返回false表示票据已被并发消费
    pub async fn consume(
        pool: &PgPool,
        ticket_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM password_resets WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            password_hash: Some("$2b$12$abcdefghijklmnopqrstuv".to_string()),
            role: Role::User,
            profile_picture: String::new(),
            phone: String::new(),
            bio: String::new(),
            is_blocked: false,
            refresh_token: Some("refresh-token-value".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn secrets_never_serialize() {
        let value = serde_json::to_value(sample_user()).unwrap();
        assert!(value.get("password_hash").is_none());
        assert!(value.get("refresh_token").is_none());
        assert_eq!(value["email"], "ann@x.com");
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
        assert_eq!(Role::Admin.as_str(), "admin");
    }

    #[tokio::test]
    async fn passwordless_accounts_never_verify() {
        let mut user = sample_user();
        user.password_hash = None;
        assert!(!user.verify_login("anything".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn stored_hash_verifies_the_original_password() {
        let mut user = sample_user();
        user.password_hash = Some(
            crate::utils::hash_password("secret1".to_string())
                .await
                .unwrap(),
        );
        assert!(user.verify_login("secret1".to_string()).await.unwrap());
        assert!(!user.verify_login("wrong".to_string()).await.unwrap());
    }
}

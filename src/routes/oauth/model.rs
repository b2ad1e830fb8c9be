use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const PROVIDER_GOOGLE: &str = "google";

/// (provider, provider_id) 全局唯一；一个用户可以挂多个提供方身份
#[derive(Debug, Serialize, FromRow)]
pub struct OAuthLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_id: String,
    pub profile_info: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OAuthLink {
    pub async fn find(
        pool: &PgPool,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, OAuthLink>(
            "SELECT * FROM oauth_providers WHERE provider = $1 AND provider_id = $2",
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn exists_for_user(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM oauth_providers WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        provider: &str,
        provider_id: &str,
        profile_info: serde_json::Value,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, OAuthLink>(
            r#"
            INSERT INTO oauth_providers (user_id, provider, provider_id, profile_info)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_id)
        .bind(profile_info)
        .fetch_one(pool)
        .await
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub access_token: String,
}

/// 提供方userinfo返回的档案；email可能缺失（未授权email scope时）
#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl GoogleUserInfo {
    /// 提供方可能只给name，或者只给given/family，都没有就退回邮箱前缀
    pub fn display_name(&self, email: &str) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        let joined = format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or(""),
            self.family_name.as_deref().unwrap_or("")
        );
        let joined = joined.trim();
        if !joined.is_empty() {
            return joined.to_string();
        }

        email.split('@').next().unwrap_or(email).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json: serde_json::Value) -> GoogleUserInfo {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parses_a_minimal_profile() {
        let parsed = info(serde_json::json!({ "sub": "1234" }));
        assert_eq!(parsed.sub, "1234");
        assert!(parsed.email.is_none());
    }

    #[test]
    fn display_name_prefers_the_full_name() {
        let parsed = info(serde_json::json!({
            "sub": "1",
            "name": "Ann Example",
            "given_name": "Ann",
            "family_name": "Example"
        }));
        assert_eq!(parsed.display_name("ann@x.com"), "Ann Example");
    }

    #[test]
    fn display_name_joins_name_parts() {
        let parsed = info(serde_json::json!({
            "sub": "1",
            "given_name": "Ann",
            "family_name": "Example"
        }));
        assert_eq!(parsed.display_name("ann@x.com"), "Ann Example");
    }

    #[test]
    fn display_name_falls_back_to_the_email_local_part() {
        let parsed = info(serde_json::json!({ "sub": "1" }));
        assert_eq!(parsed.display_name("ann@x.com"), "ann");
    }
}

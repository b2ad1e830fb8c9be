use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::routes::user::model::Role;

/// 访问令牌与冒充令牌共用的声明结构，冒充令牌额外携带操作者ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonator_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

fn expires_in(ttl_secs: u64) -> i64 {
    Utc::now()
        .checked_add_signed(chrono::Duration::seconds(ttl_secs as i64))
        .expect("valid timestamp")
        .timestamp()
}

pub fn issue_access_token(
    user_id: Uuid,
    role: Role,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        role,
        iat: Utc::now().timestamp(),
        exp: expires_in(config.access_token_ttl_secs),
        impersonator_id: None,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
    )
}

pub fn issue_refresh_token(
    user_id: Uuid,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        iat: Utc::now().timestamp(),
        exp: expires_in(config.refresh_token_ttl_secs),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
    )
}

/// 有界的支持会话令牌：1小时有效，无刷新通道
pub fn issue_impersonation_token(
    target_id: Uuid,
    role: Role,
    admin_id: Uuid,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AccessClaims {
        sub: target_id.to_string(),
        role,
        iat: Utc::now().timestamp(),
        exp: expires_in(config.impersonation_token_ttl_secs),
        impersonator_id: Some(admin_id.to_string()),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.impersonation_token_secret.as_bytes()),
    )
}

pub fn verify_access_token(
    token: &str,
    config: &Config,
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_token_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

pub fn verify_impersonation_token(
    token: &str,
    config: &Config,
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.impersonation_token_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// 纯签名校验；与用户记录上存储值的比对由调用方完成
pub fn verify_refresh_token(
    token: &str,
    config: &Config,
) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn access_token_roundtrip() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = issue_access_token(user_id, Role::User, &config).unwrap();
        let claims = verify_access_token(&token, &config).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::User);
        assert!(claims.impersonator_id.is_none());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_roundtrip() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = issue_refresh_token(user_id, &config).unwrap();
        let claims = verify_refresh_token(&token, &config).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn impersonation_token_carries_both_identities() {
        let config = test_config();
        let admin_id = Uuid::new_v4();
        let target_id = Uuid::new_v4();

        let token = issue_impersonation_token(target_id, Role::User, admin_id, &config).unwrap();
        let claims = verify_impersonation_token(&token, &config).unwrap();

        assert_eq!(claims.sub, target_id.to_string());
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.impersonator_id, Some(admin_id.to_string()));
    }

    #[test]
    fn token_classes_do_not_cross_verify() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let access = issue_access_token(user_id, Role::User, &config).unwrap();
        let refresh = issue_refresh_token(user_id, &config).unwrap();
        let impersonation =
            issue_impersonation_token(user_id, Role::User, Uuid::new_v4(), &config).unwrap();

        assert!(verify_refresh_token(&access, &config).is_err());
        assert!(verify_access_token(&refresh, &config).is_err());
        assert!(verify_access_token(&impersonation, &config).is_err());
        assert!(verify_impersonation_token(&access, &config).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = test_config();
        let claims = AccessClaims {
            sub: Uuid::new_v4().to_string(),
            role: Role::Admin,
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
            impersonator_id: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
        )
        .unwrap();

        assert!(verify_access_token(&token, &config).is_err());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let config = test_config();
        let token = issue_access_token(Uuid::new_v4(), Role::User, &config).unwrap();

        let mut other = test_config();
        other.access_token_secret = "another-secret".to_string();
        assert!(verify_access_token(&token, &other).is_err());
    }
}

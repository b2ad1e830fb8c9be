use axum::Json;
use axum::http::header::{HeaderName, SET_COOKIE};
use bcrypt::{DEFAULT_COST, hash, verify};
use rand::RngCore;
use serde::Serialize;

use crate::config::Config;
use crate::error::AppError;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// bcrypt 的工作因子刻意很慢，放到阻塞线程池里算，避免拖住其它请求
pub async fn hash_password(password: String) -> Result<String, AppError> {
    let hashed =
        tokio::task::spawn_blocking(move || hash(password.as_bytes(), DEFAULT_COST)).await??;
    Ok(hashed)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let matched =
        tokio::task::spawn_blocking(move || verify(password.as_bytes(), &hash)).await??;
    Ok(matched)
}

/// 256位随机重置令牌，hex编码
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: None,
        data: Some(data),
    })
}

pub fn message_to_api_response(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.into()),
        data: None,
    })
}

pub fn error_to_api_response<T: Serialize>(message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: false,
        message: Some(message.into()),
        data: None,
    })
}

pub fn build_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Strict",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

pub fn access_cookie(token: &str, config: &Config) -> String {
    build_cookie(
        ACCESS_COOKIE,
        token,
        config.access_token_ttl_secs,
        config.cookie_secure,
    )
}

pub fn session_cookies(
    access: &str,
    refresh: &str,
    config: &Config,
) -> [(HeaderName, String); 2] {
    [
        (SET_COOKIE, access_cookie(access, config)),
        (
            SET_COOKIE,
            build_cookie(
                REFRESH_COOKIE,
                refresh,
                config.refresh_token_ttl_secs,
                config.cookie_secure,
            ),
        ),
    ]
}

pub fn clear_session_cookies(config: &Config) -> [(HeaderName, String); 2] {
    [
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE, config.cookie_secure)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE, config.cookie_secure)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify_roundtrip() {
        let hashed = hash_password("secret1".to_string()).await.unwrap();
        assert_ne!(hashed, "secret1");
        assert!(verify_password("secret1".to_string(), hashed.clone())
            .await
            .unwrap());
        assert!(!verify_password("wrong".to_string(), hashed).await.unwrap());
    }

    #[test]
    fn reset_tokens_are_long_and_unique() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ann@X.com "), "ann@x.com");
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = build_cookie(ACCESS_COOKIE, "tok", 900, false);
        assert!(cookie.starts_with("accessToken=tok"));
        assert!(cookie.contains("Max-Age=900"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));

        let secure = build_cookie(REFRESH_COOKIE, "tok", 604_800, true);
        assert!(secure.contains("; Secure"));
    }

    #[test]
    fn clearing_expires_immediately() {
        assert!(clear_cookie(ACCESS_COOKIE, false).contains("Max-Age=0"));
    }

    #[test]
    fn error_envelope_carries_no_data() {
        let Json(body) = error_to_api_response::<()>("nope");
        assert!(!body.success);
        assert_eq!(body.message.as_deref(), Some("nope"));
        assert!(body.data.is_none());
    }
}

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub impersonation_token_secret: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub impersonation_token_ttl_secs: u64,
    pub reset_ticket_ttl_secs: u64,
    pub frontend_url: String,
    pub google_userinfo_url: String,
    pub cookie_secure: bool,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "::".to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".to_string()),
            // 三类令牌各自独立的签名密钥
            access_token_secret: env::var("ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: env::var("REFRESH_TOKEN_SECRET")?,
            impersonation_token_secret: env::var("IMPERSONATION_TOKEN_SECRET")?,
            access_token_ttl_secs: parse_secs("ACCESS_TOKEN_TTL", 15 * 60),
            refresh_token_ttl_secs: parse_secs("REFRESH_TOKEN_TTL", 7 * 24 * 60 * 60),
            impersonation_token_ttl_secs: parse_secs("IMPERSONATION_TOKEN_TTL", 60 * 60),
            reset_ticket_ttl_secs: parse_secs("RESET_TICKET_TTL", 60 * 60),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v3/userinfo".to_string()),
            cookie_secure: env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            email_api_url: env::var("EMAIL_API_URL").ok(),
            email_api_key: env::var("EMAIL_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string()),
        })
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    pub fn impersonation_token_ttl(&self) -> Duration {
        Duration::from_secs(self.impersonation_token_ttl_secs)
    }

    pub fn reset_ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_ticket_ttl_secs)
    }
}

fn parse_secs(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/userhub_test".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        api_base_uri: "/api".to_string(),
        access_token_secret: "access-test-secret".to_string(),
        refresh_token_secret: "refresh-test-secret".to_string(),
        impersonation_token_secret: "impersonation-test-secret".to_string(),
        access_token_ttl_secs: 15 * 60,
        refresh_token_ttl_secs: 7 * 24 * 60 * 60,
        impersonation_token_ttl_secs: 60 * 60,
        reset_ticket_ttl_secs: 60 * 60,
        frontend_url: "http://localhost:5173".to_string(),
        google_userinfo_url: "http://localhost:9/userinfo".to_string(),
        cookie_secure: false,
        email_api_url: None,
        email_api_key: None,
        email_from: "no-reply@localhost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_accessors_expose_seconds() {
        let config = test_config();
        assert_eq!(config.access_token_ttl(), Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.impersonation_token_ttl(), Duration::from_secs(3600));
    }
}

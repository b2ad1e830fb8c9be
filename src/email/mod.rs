use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// 邮件投递抽象；忘记密码流程不关心投递方式
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;
}

/// 本地开发用：只打日志，不真正发信
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "email delivery stub"
        );
        Ok(())
    }
}

pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String, from: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": message.to,
                "subject": message.subject,
                "html": message.html,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "mail API returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

pub fn sender_from_config(config: &Config, client: reqwest::Client) -> Arc<dyn EmailSender> {
    match (&config.email_api_url, &config.email_api_key) {
        (Some(endpoint), Some(api_key)) => Arc::new(HttpEmailSender::new(
            client,
            endpoint.clone(),
            api_key.clone(),
            config.email_from.clone(),
        )),
        _ => Arc::new(LogEmailSender),
    }
}

pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!(
        "{}/page-reset-password?token={}",
        frontend_url.trim_end_matches('/'),
        token
    )
}

pub fn password_reset_email(to: &str, reset_link: &str) -> EmailMessage {
    let html = format!(
        "<p>You requested to reset your account password. Click the link below to set a new \
         password. The link expires in <strong>1 hour</strong>.</p>\
         <p><a href=\"{link}\">Reset Password</a></p>\
         <p>If you didn't request this, you can safely ignore this email. Your password will \
         not be changed.</p>\
         <p>If the link doesn't work, copy and paste this URL into your browser:<br/>{link}</p>",
        link = reset_link
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Reset Your Password".to_string(),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_link_embeds_the_raw_token() {
        let link = reset_link("http://localhost:5173/", "abc123");
        assert_eq!(link, "http://localhost:5173/page-reset-password?token=abc123");
    }

    #[test]
    fn reset_email_contains_the_link() {
        let message = password_reset_email("ann@x.com", "http://x/page-reset-password?token=t");
        assert_eq!(message.to, "ann@x.com");
        assert!(message.html.contains("http://x/page-reset-password?token=t"));
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let message = password_reset_email("ann@x.com", "http://x");
        assert!(sender.send(&message).await.is_ok());
    }

    #[test]
    fn sender_falls_back_to_log_stub() {
        let config = crate::config::test_config();
        // 没有配置邮件API时使用日志桩
        let _sender = sender_from_config(&config, reqwest::Client::new());
    }
}

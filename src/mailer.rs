use crate::config::MailerConfig;
use crate::error::QuillError;
use serde::Serialize;
use tracing::info;

/// One outbound message. Bodies are plain text.
#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Thin client for a resend-style JSON email API. With no endpoint
/// configured, messages are logged instead, the development mode.
#[derive(Clone)]
pub struct Mailer {
    cfg: MailerConfig,
    client: reqwest::Client,
}

impl Mailer {
    pub fn new(cfg: MailerConfig, client: reqwest::Client) -> Self {
        Self { cfg, client }
    }

    pub async fn send(&self, email: Email) -> Result<(), QuillError> {
        let Some(endpoint) = self.cfg.endpoint.as_ref() else {
            info!(
                to = %email.to,
                subject = %email.subject,
                body = %email.text,
                "mailer endpoint not configured; logging message instead"
            );
            return Ok(());
        };

        let request = SendRequest {
            from: &self.cfg.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
        };

        let resp = self
            .client
            .post(endpoint.clone())
            .bearer_auth(&self.cfg.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(QuillError::UpstreamStatus(resp.status()));
        }
        Ok(())
    }
}

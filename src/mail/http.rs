//! HTTP transactional mail client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MailError, Mailer, SentEmail};
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Mailer backed by a transactional email HTTP API.
pub struct HttpMailer {
    api_base: String,
    api_key: Option<String>,
    from: String,
    http: reqwest::Client,
}

impl HttpMailer {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api_base: config.mail_api_base.clone(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Construct a mailer with explicit settings (useful for tests).
    pub fn new(api_base: String, api_key: Option<String>, from: String) -> Self {
        Self {
            api_base,
            api_key,
            from,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<SentEmail, MailError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(MailError::NotConfigured {
                detail: "mail API key is not set".to_string(),
            });
        };

        debug!(to, subject, "Dispatching report email");

        let request = SendRequest {
            from: &self.from,
            to,
            subject,
            html,
        };

        let response = self
            .http
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MailError::Network {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let body: SendResponse = response.json().await.map_err(|e| MailError::MalformedResponse {
            detail: e.to_string(),
        })?;

        Ok(SentEmail {
            message_id: body.id,
        })
    }
}

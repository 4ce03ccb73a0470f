//! Outbound mail abstraction.
//!
//! Report emails go out through a [`Mailer`]; the production implementation
//! posts to an HTTP transactional mail API, and tests substitute their own.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpMailer;

/// A successfully dispatched email.
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Provider-assigned message identifier.
    pub message_id: String,
}

/// Errors that can occur while sending mail.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail API returned status {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("network error sending mail: {detail}")]
    Network { detail: String },

    #[error("malformed mail API response: {detail}")]
    MalformedResponse { detail: String },

    #[error("mailer is not configured: {detail}")]
    NotConfigured { detail: String },
}

/// Sends report emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<SentEmail, MailError>;
}

//! Provider adapters for the wellness data sources.
//!
//! Each adapter knows how to refresh an OAuth access token against its
//! provider's token endpoint and how to fetch the raw wellness payload for a
//! report date. Refresh failures are classified into [`RefreshError`] so the
//! token lifecycle can distinguish revoked grants from transient outages.

pub mod fitbit;
pub mod google;
pub mod spotify;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::AppConfig;
use fitbit::FitbitAdapter;
use google::{GmailAdapter, GoogleCalendarAdapter, GoogleOauth, GoogleTasksAdapter};
use spotify::SpotifyAdapter;

/// Provider slugs recognized by the token store.
pub const FITBIT: &str = "fitbit";
pub const GMAIL: &str = "gmail";
pub const GOOGLE_CALENDAR: &str = "google_calendar";
pub const GOOGLE_TASKS: &str = "google_tasks";
pub const SPOTIFY: &str = "spotify";

/// A successfully refreshed credential.
///
/// `refresh_token` is `None` when the provider did not rotate it; the caller
/// keeps the previous refresh token in that case.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Classified refresh failures.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The grant was revoked or is otherwise permanently unusable. The user
    /// must reconnect the integration.
    #[error("refresh grant rejected: {detail}")]
    InvalidGrant { detail: String },

    /// Network errors, 5xx responses and rate limits. Worth retrying later.
    #[error("transient refresh failure: {detail}")]
    Transient { detail: String },
}

/// Failures while fetching report data from a provider API.
///
/// All fetch failures are retryable from the job queue's perspective.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider returned status {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("network error: {detail}")]
    Network { detail: String },

    #[error("malformed provider response: {detail}")]
    MalformedResponse { detail: String },
}

/// Classify a non-success token endpoint response.
///
/// OAuth error bodies carrying `invalid_grant` and friends mean the stored
/// refresh token is dead regardless of status code. Plain 400/401 responses
/// from a token endpoint are treated the same way; everything else (429, 5xx)
/// is transient.
pub(crate) fn classify_refresh_failure(status: StatusCode, body: &str) -> RefreshError {
    let body_lower = body.to_lowercase();

    if body_lower.contains("invalid_grant")
        || body_lower.contains("invalid_client")
        || body_lower.contains("unauthorized_client")
        || body_lower.contains("revoked")
    {
        return RefreshError::InvalidGrant {
            detail: format!("status {}: {}", status, body),
        };
    }

    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        return RefreshError::InvalidGrant {
            detail: format!("status {}: {}", status, body),
        };
    }

    RefreshError::Transient {
        detail: format!("status {}: {}", status, body),
    }
}

/// Interface implemented by every wellness data provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier used as the token store's provider key.
    fn slug(&self) -> &'static str;

    /// Exchange a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError>;

    /// Fetch the raw wellness payload covering `date`.
    async fn fetch_data(&self, access_token: &str, date: NaiveDate)
    -> Result<JsonValue, FetchError>;
}

/// Registry of configured provider adapters keyed by slug.
///
/// Providers without client credentials are not registered; token rows for
/// an unregistered provider are reported as failed during refresh.
pub struct Registry {
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl Registry {
    /// Build the registry from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_http_timeout_seconds))
            .build()
            .unwrap_or_default();

        let mut adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>> = HashMap::new();

        if let (Some(id), Some(secret)) = (&config.fitbit_client_id, &config.fitbit_client_secret)
        {
            adapters.insert(
                FITBIT,
                Arc::new(FitbitAdapter::new(
                    id.clone(),
                    secret.clone(),
                    config.fitbit_token_url.clone(),
                    config.fitbit_api_base.clone(),
                    http.clone(),
                )),
            );
        }

        if let (Some(id), Some(secret)) = (&config.google_client_id, &config.google_client_secret)
        {
            let oauth = GoogleOauth::new(
                id.clone(),
                secret.clone(),
                config.google_token_url.clone(),
                http.clone(),
            );
            adapters.insert(
                GMAIL,
                Arc::new(GmailAdapter::new(
                    oauth.clone(),
                    config.gmail_api_base.clone(),
                )),
            );
            adapters.insert(
                GOOGLE_CALENDAR,
                Arc::new(GoogleCalendarAdapter::new(
                    oauth.clone(),
                    config.google_calendar_api_base.clone(),
                )),
            );
            adapters.insert(
                GOOGLE_TASKS,
                Arc::new(GoogleTasksAdapter::new(
                    oauth,
                    config.google_tasks_api_base.clone(),
                )),
            );
        }

        if let (Some(id), Some(secret)) =
            (&config.spotify_client_id, &config.spotify_client_secret)
        {
            adapters.insert(
                SPOTIFY,
                Arc::new(SpotifyAdapter::new(
                    id.clone(),
                    secret.clone(),
                    config.spotify_token_url.clone(),
                    config.spotify_api_base.clone(),
                    http,
                )),
            );
        }

        Self { adapters }
    }

    /// Build an empty registry (useful for tests).
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter explicitly (useful for tests).
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.slug(), adapter);
    }

    /// Look up an adapter by provider slug.
    pub fn get(&self, slug: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(slug)
    }

    /// Slugs of all registered providers.
    pub fn slugs(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }
}

//! Google provider adapters (Gmail, Calendar, Tasks).
//!
//! All three share one OAuth client; they differ only in slug and in the API
//! they pull report data from. Google does not rotate refresh tokens on
//! refresh, so [`RefreshedToken::refresh_token`] is always `None` unless the
//! token endpoint unexpectedly returns one.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{FetchError, ProviderAdapter, RefreshError, RefreshedToken, classify_refresh_failure};

/// Token endpoint response shared by all Google APIs.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    #[allow(dead_code)]
    scope: Option<String>,
}

/// Shared OAuth client for the Google token endpoint.
#[derive(Clone)]
pub struct GoogleOauth {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
}

impl GoogleOauth {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_url,
            http,
        }
    }

    /// Exchange a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        let mut params = HashMap::new();
        params.insert("client_id".to_string(), self.client_id.clone());
        params.insert("client_secret".to_string(), self.client_secret.clone());
        params.insert("refresh_token".to_string(), refresh_token.to_string());
        params.insert("grant_type".to_string(), "refresh_token".to_string());

        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError::Transient {
                detail: format!("Token refresh request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(status, &body));
        }

        let token: GoogleTokenResponse =
            response.json().await.map_err(|e| RefreshError::Transient {
                detail: format!("Failed to parse token response: {}", e),
            })?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
        })
    }
}

/// Run an authenticated GET against a provider API and return the JSON body.
async fn fetch_json(
    http: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
    access_token: &str,
) -> Result<JsonValue, FetchError> {
    let response = http
        .get(url)
        .query(query)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(FetchError::Http {
            status: status.as_u16(),
            detail,
        });
    }

    response.json().await.map_err(|e| FetchError::MalformedResponse {
        detail: e.to_string(),
    })
}

/// Gmail adapter: pulls the message list for the report date.
pub struct GmailAdapter {
    oauth: GoogleOauth,
    api_base: String,
}

impl GmailAdapter {
    pub fn new(oauth: GoogleOauth, api_base: String) -> Self {
        Self { oauth, api_base }
    }
}

#[async_trait]
impl ProviderAdapter for GmailAdapter {
    fn slug(&self) -> &'static str {
        super::GMAIL
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        self.oauth.refresh(refresh_token).await
    }

    async fn fetch_data(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<JsonValue, FetchError> {
        let next_day = date + Duration::days(1);
        let query = format!(
            "after:{} before:{}",
            date.format("%Y/%m/%d"),
            next_day.format("%Y/%m/%d")
        );

        debug!(%date, "Fetching Gmail message list");

        let url = format!("{}/gmail/v1/users/me/messages", self.api_base);
        fetch_json(
            &self.oauth.http,
            &url,
            &[("q", query), ("maxResults", "100".to_string())],
            access_token,
        )
        .await
    }
}

/// Google Calendar adapter: pulls the primary calendar's events for the date.
pub struct GoogleCalendarAdapter {
    oauth: GoogleOauth,
    api_base: String,
}

impl GoogleCalendarAdapter {
    pub fn new(oauth: GoogleOauth, api_base: String) -> Self {
        Self { oauth, api_base }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleCalendarAdapter {
    fn slug(&self) -> &'static str {
        super::GOOGLE_CALENDAR
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        self.oauth.refresh(refresh_token).await
    }

    async fn fetch_data(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<JsonValue, FetchError> {
        let time_min = format!("{}T00:00:00Z", date);
        let time_max = format!("{}T00:00:00Z", date + Duration::days(1));

        debug!(%date, "Fetching calendar events");

        let url = format!("{}/calendars/primary/events", self.api_base);
        fetch_json(
            &self.oauth.http,
            &url,
            &[
                ("timeMin", time_min),
                ("timeMax", time_max),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ],
            access_token,
        )
        .await
    }
}

/// Google Tasks adapter: pulls the default task list.
pub struct GoogleTasksAdapter {
    oauth: GoogleOauth,
    api_base: String,
}

impl GoogleTasksAdapter {
    pub fn new(oauth: GoogleOauth, api_base: String) -> Self {
        Self { oauth, api_base }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleTasksAdapter {
    fn slug(&self) -> &'static str {
        super::GOOGLE_TASKS
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        self.oauth.refresh(refresh_token).await
    }

    async fn fetch_data(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<JsonValue, FetchError> {
        let due_max = format!("{}T00:00:00Z", date + Duration::days(1));

        debug!(%date, "Fetching task list");

        let url = format!("{}/tasks/v1/lists/@default/tasks", self.api_base);
        fetch_json(
            &self.oauth.http,
            &url,
            &[
                ("dueMax", due_max),
                ("showCompleted", "true".to_string()),
                ("showHidden", "true".to_string()),
            ],
            access_token,
        )
        .await
    }
}

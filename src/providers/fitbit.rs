//! Fitbit provider adapter.
//!
//! Fitbit authenticates token refreshes with HTTP Basic auth and rotates the
//! refresh token on every successful refresh, so the returned token always
//! carries a new refresh token.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use super::{FetchError, ProviderAdapter, RefreshError, RefreshedToken, classify_refresh_failure};

#[derive(Debug, Deserialize)]
struct FitbitTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    scope: Option<String>,
}

pub struct FitbitAdapter {
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base: String,
    http: reqwest::Client,
}

impl FitbitAdapter {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        api_base: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_url,
            api_base,
            http,
        }
    }

    async fn fetch_endpoint(
        &self,
        access_token: &str,
        path: &str,
    ) -> Result<JsonValue, FetchError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
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

        response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse {
                detail: e.to_string(),
            })
    }
}

#[async_trait]
impl ProviderAdapter for FitbitAdapter {
    fn slug(&self) -> &'static str {
        super::FITBIT
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
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

        let token: FitbitTokenResponse =
            response.json().await.map_err(|e| RefreshError::Transient {
                detail: format!("Failed to parse token response: {}", e),
            })?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: Some(token.refresh_token),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
        })
    }

    async fn fetch_data(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<JsonValue, FetchError> {
        debug!(%date, "Fetching Fitbit activity and sleep summaries");

        let activity = self
            .fetch_endpoint(
                access_token,
                &format!("/1/user/-/activities/date/{}.json", date),
            )
            .await?;
        let sleep = self
            .fetch_endpoint(access_token, &format!("/1.2/user/-/sleep/date/{}.json", date))
            .await?;

        Ok(json!({
            "activity": activity,
            "sleep": sleep,
        }))
    }
}

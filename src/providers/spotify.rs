//! Spotify provider adapter.
//!
//! Spotify authenticates refreshes with HTTP Basic auth and only sometimes
//! rotates the refresh token; when the response omits one, the stored token
//! stays valid.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{FetchError, ProviderAdapter, RefreshError, RefreshedToken, classify_refresh_failure};

#[derive(Debug, Deserialize)]
struct SpotifyTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    scope: Option<String>,
}

pub struct SpotifyAdapter {
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base: String,
    http: reqwest::Client,
}

impl SpotifyAdapter {
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
}

#[async_trait]
impl ProviderAdapter for SpotifyAdapter {
    fn slug(&self) -> &'static str {
        super::SPOTIFY
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

        let token: SpotifyTokenResponse =
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

    async fn fetch_data(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<JsonValue, FetchError> {
        // Spotify's history endpoint is cursor based; "after" takes a Unix
        // millisecond timestamp marking the start of the report date.
        let after_ms = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();

        debug!(%date, "Fetching Spotify listening history");

        let response = self
            .http
            .get(format!("{}/v1/me/player/recently-played", self.api_base))
            .query(&[("limit", "50".to_string()), ("after", after_ms.to_string())])
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

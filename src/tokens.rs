//! Token lifecycle management.
//!
//! Before a report job touches provider APIs, [`TokenLifecycle`] walks every
//! integration the user has connected, refreshes the expired ones and flags
//! dead grants for reconnection. Refreshes for the same (user, provider) pair
//! are serialized through a per-pair async lock so concurrent jobs cannot
//! double-spend a one-time-use refresh token.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::integration_token;
use crate::providers::{RefreshError, Registry};
use crate::repositories::TokenRepository;

/// Seconds of clock skew tolerated when deciding whether a token is expired.
/// A token within this window of its expiry is refreshed eagerly.
const EXPIRY_SKEW_SECONDS: i64 = 30;

/// Outcome of ensuring freshness for one provider integration.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub provider_slug: String,
    pub success: bool,
    pub reason: Option<String>,
}

impl RefreshOutcome {
    fn ok(provider_slug: String) -> Self {
        Self {
            provider_slug,
            success: true,
            reason: None,
        }
    }

    fn failed<S: Into<String>>(provider_slug: String, reason: S) -> Self {
        Self {
            provider_slug,
            success: false,
            reason: Some(reason.into()),
        }
    }
}

type PairLock = Arc<Mutex<()>>;

/// Manages OAuth token freshness across a user's connected providers.
#[derive(Clone)]
pub struct TokenLifecycle {
    repo: TokenRepository,
    registry: Arc<Registry>,
    refresh_locks: Arc<Mutex<HashMap<(Uuid, String), PairLock>>>,
}

impl TokenLifecycle {
    pub fn new(repo: TokenRepository, registry: Arc<Registry>) -> Self {
        Self {
            repo,
            registry,
            refresh_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True when the stored token can be used as-is.
    ///
    /// A missing expiry means a legacy row that never recorded one; those are
    /// deliberately treated as always valid rather than always expired, since
    /// refreshing them would churn tokens that still work.
    fn is_fresh(token: &integration_token::Model) -> bool {
        if token.needs_reconnection {
            return false;
        }
        match token.expires_at {
            None => true,
            Some(expires_at) => {
                let threshold = Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS);
                expires_at > threshold
            }
        }
    }

    /// Cheap connectivity check used to reject job submissions early: does
    /// the user have any integration row not flagged for reconnection?
    pub async fn has_valid_integrations(&self, user_id: Uuid) -> Result<bool> {
        let tokens = self.repo.find_by_user(user_id).await?;
        Ok(tokens.iter().any(|t| !t.needs_reconnection))
    }

    /// True when at least one integration holds a usable access token right
    /// now. Called after [`ensure_fresh_tokens`](Self::ensure_fresh_tokens)
    /// so refreshed rows are visible.
    pub async fn has_working_integration(&self, user_id: Uuid) -> Result<bool> {
        let tokens = self.repo.find_by_user(user_id).await?;
        Ok(tokens.iter().any(Self::is_fresh))
    }

    /// Token rows currently usable for data fetching.
    pub async fn usable_tokens(&self, user_id: Uuid) -> Result<Vec<integration_token::Model>> {
        let tokens = self.repo.find_by_user(user_id).await?;
        Ok(tokens.into_iter().filter(Self::is_fresh).collect())
    }

    /// Walk all of the user's integrations and refresh the stale ones
    /// concurrently. One failing provider never aborts the others; the
    /// caller inspects the per-provider outcomes.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn ensure_fresh_tokens(&self, user_id: Uuid) -> Result<Vec<RefreshOutcome>> {
        let tokens = self.repo.find_by_user(user_id).await?;

        let mut handles = Vec::with_capacity(tokens.len());
        for token in tokens {
            let lifecycle = self.clone();
            handles.push(tokio::spawn(async move {
                lifecycle.ensure_one(token).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    warn!(error = ?join_err, "Token refresh task panicked");
                }
            }
        }

        Ok(outcomes)
    }

    /// Ensure a single integration token is fresh, refreshing it if needed.
    async fn ensure_one(&self, token: integration_token::Model) -> RefreshOutcome {
        let slug = token.provider_slug.clone();

        if token.needs_reconnection {
            return RefreshOutcome::failed(slug, "reconnection required");
        }

        if Self::is_fresh(&token) {
            return RefreshOutcome::ok(slug);
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return RefreshOutcome::failed(slug, "no refresh token available");
        };

        // Serialize refreshes per (user, provider) pair. Providers like
        // Fitbit invalidate the old refresh token on use, so two concurrent
        // refreshes with the same token would strand the integration.
        let pair_lock = self.pair_lock(token.user_id, &slug).await;
        let outcome = {
            let _guard = pair_lock.lock().await;
            self.refresh_under_lock(&token, refresh_token).await
        };
        self.release_pair_lock(token.user_id, &slug, pair_lock).await;
        outcome
    }

    /// Refresh body executed while holding the pair lock.
    async fn refresh_under_lock(
        &self,
        token: &integration_token::Model,
        refresh_token: String,
    ) -> RefreshOutcome {
        let slug = token.provider_slug.clone();

        // Re-read under the lock: another job may have refreshed while we
        // waited.
        let current = match self
            .repo
            .find_by_user_provider(token.user_id, &slug)
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => return RefreshOutcome::failed(slug, "integration removed"),
            Err(err) => return RefreshOutcome::failed(slug, format!("token lookup failed: {}", err)),
        };

        if Self::is_fresh(&current) {
            counter!("token_refresh_coalesced_total").increment(1);
            return RefreshOutcome::ok(slug);
        }

        let refresh_token = current.refresh_token.clone().unwrap_or(refresh_token);
        self.refresh_now(current, &refresh_token).await
    }

    /// Perform the provider call and persist the result. Caller holds the
    /// pair lock.
    async fn refresh_now(
        &self,
        token: integration_token::Model,
        refresh_token: &str,
    ) -> RefreshOutcome {
        let slug = token.provider_slug.clone();

        let Some(adapter) = self.registry.get(&slug) else {
            return RefreshOutcome::failed(slug, "provider not configured");
        };

        counter!("token_refresh_attempts_total", "provider" => slug.clone()).increment(1);

        match adapter.refresh(refresh_token).await {
            Ok(refreshed) => {
                if let Err(err) = self.repo.apply_refresh(&token, &refreshed).await {
                    counter!("token_refresh_failures_total", "provider" => slug.clone())
                        .increment(1);
                    return RefreshOutcome::failed(slug, format!("failed to persist token: {}", err));
                }

                counter!("token_refresh_success_total", "provider" => slug.clone()).increment(1);
                info!(provider = %slug, user_id = %token.user_id, "Refreshed access token");
                RefreshOutcome::ok(slug)
            }
            Err(RefreshError::InvalidGrant { detail }) => {
                counter!("token_refresh_invalid_grant_total", "provider" => slug.clone())
                    .increment(1);
                warn!(
                    provider = %slug,
                    user_id = %token.user_id,
                    detail = %detail,
                    "Refresh grant rejected, flagging integration for reconnection"
                );

                if let Err(err) = self.repo.mark_needs_reconnection(token.id).await {
                    warn!(error = ?err, "Failed to flag integration for reconnection");
                }

                RefreshOutcome::failed(slug, "reconnection required")
            }
            Err(RefreshError::Transient { detail }) => {
                counter!("token_refresh_failures_total", "provider" => slug.clone()).increment(1);
                warn!(
                    provider = %slug,
                    user_id = %token.user_id,
                    detail = %detail,
                    "Transient token refresh failure"
                );
                RefreshOutcome::failed(slug, detail)
            }
        }
    }

    async fn pair_lock(&self, user_id: Uuid, provider_slug: &str) -> PairLock {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry((user_id, provider_slug.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return this task's handle and evict the registry entry once no other
    /// task holds one, so the map does not grow with every pair ever seen.
    async fn release_pair_lock(&self, user_id: Uuid, provider_slug: &str, lock: PairLock) {
        let mut locks = self.refresh_locks.lock().await;
        drop(lock);
        let key = (user_id, provider_slug.to_string());
        if locks
            .get(&key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_row(
        expires_at: Option<chrono::DateTime<Utc>>,
        needs_reconnection: bool,
    ) -> integration_token::Model {
        let now = Utc::now();
        integration_token::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider_slug: "spotify".to_string(),
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: expires_at.map(Into::into),
            scope: None,
            needs_reconnection,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_legacy_token_without_expiry_is_fresh() {
        let token = token_row(None, false);
        assert!(TokenLifecycle::is_fresh(&token));
    }

    #[test]
    fn test_future_expiry_is_fresh() {
        let token = token_row(Some(Utc::now() + Duration::hours(1)), false);
        assert!(TokenLifecycle::is_fresh(&token));
    }

    #[test]
    fn test_past_expiry_is_stale() {
        let token = token_row(Some(Utc::now() - Duration::hours(1)), false);
        assert!(!TokenLifecycle::is_fresh(&token));
    }

    #[test]
    fn test_expiry_within_skew_window_is_stale() {
        let token = token_row(
            Some(Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS / 2)),
            false,
        );
        assert!(!TokenLifecycle::is_fresh(&token));
    }

    #[test]
    fn test_flagged_token_is_never_fresh() {
        let token = token_row(None, true);
        assert!(!TokenLifecycle::is_fresh(&token));
    }

    #[tokio::test]
    async fn test_refresh_lock_registry_is_drained_after_refresh() {
        use migration::{Migrator, MigratorTrait};

        let db = Arc::new(
            sea_orm::Database::connect("sqlite::memory:")
                .await
                .unwrap(),
        );
        Migrator::up(db.as_ref(), None).await.unwrap();

        let repo = TokenRepository::new(Arc::clone(&db));
        let user_id = Uuid::new_v4();
        repo.create(
            user_id,
            "spotify",
            "access",
            Some("refresh"),
            Some(Utc::now() - Duration::hours(1)),
            None,
        )
        .await
        .unwrap();

        let lifecycle = TokenLifecycle::new(repo, Arc::new(Registry::empty()));
        let outcomes = lifecycle.ensure_fresh_tokens(user_id).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);

        assert!(lifecycle.refresh_locks.lock().await.is_empty());
    }
}

//! Integration token repository
//!
//! Encapsulates SeaORM operations for the integration_tokens table. The
//! (user_id, provider_slug) pair is unique; refreshed credentials are applied
//! with an upsert so concurrent refreshes cannot create duplicate rows.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::models::integration_token::{self, Column, Entity as IntegrationToken};
use crate::providers::RefreshedToken;

/// Repository for integration token database operations
#[derive(Debug, Clone)]
pub struct TokenRepository {
    pub db: Arc<DatabaseConnection>,
}

impl TokenRepository {
    /// Creates a new TokenRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All token rows for a user, one per connected provider.
    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<integration_token::Model>> {
        let rows = IntegrationToken::find()
            .filter(Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// The token row for a specific (user, provider) pair, if connected.
    pub async fn find_by_user_provider(
        &self,
        user_id: Uuid,
        provider_slug: &str,
    ) -> Result<Option<integration_token::Model>> {
        let row = IntegrationToken::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ProviderSlug.eq(provider_slug))
            .one(self.db.as_ref())
            .await?;
        Ok(row)
    }

    /// Insert a new token row for a user/provider pair.
    pub async fn create(
        &self,
        user_id: Uuid,
        provider_slug: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        scope: Option<&str>,
    ) -> Result<integration_token::Model> {
        let now = Utc::now();
        let model = integration_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider_slug: Set(provider_slug.to_string()),
            access_token: Set(access_token.to_string()),
            refresh_token: Set(refresh_token.map(|t| t.to_string())),
            expires_at: Set(expires_at.map(Into::into)),
            scope: Set(scope.map(|s| s.to_string())),
            needs_reconnection: Set(false),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let row = model.insert(self.db.as_ref()).await?;
        Ok(row)
    }

    /// Apply a refreshed credential to the stored row.
    ///
    /// When the provider did not rotate the refresh token, `prior` supplies
    /// the value that stays in place. A successful refresh always clears the
    /// reconnection flag.
    pub async fn apply_refresh(
        &self,
        prior: &integration_token::Model,
        refreshed: &RefreshedToken,
    ) -> Result<()> {
        let refresh_token = refreshed
            .refresh_token
            .clone()
            .or_else(|| prior.refresh_token.clone());

        // Fresh id so the only conflict is the (user_id, provider_slug)
        // index the upsert arbitrates on; the existing row keeps its id.
        let now = Utc::now();
        let model = integration_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(prior.user_id),
            provider_slug: Set(prior.provider_slug.clone()),
            access_token: Set(refreshed.access_token.clone()),
            refresh_token: Set(refresh_token),
            expires_at: Set(refreshed.expires_at.map(Into::into)),
            scope: Set(prior.scope.clone()),
            needs_reconnection: Set(false),
            created_at: Set(prior.created_at),
            updated_at: Set(now.into()),
        };

        IntegrationToken::insert(model)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::ProviderSlug])
                    .update_columns([
                        Column::AccessToken,
                        Column::RefreshToken,
                        Column::ExpiresAt,
                        Column::NeedsReconnection,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Flag a token row as needing user reconnection after a permanent
    /// refresh failure.
    pub async fn mark_needs_reconnection(&self, token_id: Uuid) -> Result<()> {
        let model = integration_token::ActiveModel {
            id: Set(token_id),
            needs_reconnection: Set(true),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };

        model.update(self.db.as_ref()).await?;
        Ok(())
    }
}

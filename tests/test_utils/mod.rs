//! Shared helpers for integration tests.

#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use uuid::Uuid;

use reports::migration::{Migrator, MigratorTrait};
use reports::models::integration_token;
use reports::repositories::TokenRepository;

/// In-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Insert an integration token row for a user.
pub async fn insert_token(
    db: &Arc<DatabaseConnection>,
    user_id: Uuid,
    provider_slug: &str,
    refresh_token: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<integration_token::Model> {
    let repo = TokenRepository::new(Arc::clone(db));
    repo.create(
        user_id,
        provider_slug,
        "test-access-token",
        refresh_token,
        expires_at,
        None,
    )
    .await
}

/// Insert a token row already flagged for reconnection.
pub async fn insert_flagged_token(
    db: &Arc<DatabaseConnection>,
    user_id: Uuid,
    provider_slug: &str,
) -> Result<integration_token::Model> {
    let repo = TokenRepository::new(Arc::clone(db));
    let row = repo
        .create(
            user_id,
            provider_slug,
            "test-access-token",
            Some("dead-refresh-token"),
            None,
            None,
        )
        .await?;
    repo.mark_needs_reconnection(row.id).await?;
    repo.find_by_user_provider(user_id, provider_slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("flagged token row missing"))
}

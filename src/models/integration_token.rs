//! IntegrationToken entity model
//!
//! This module contains the SeaORM entity model for the integration_tokens
//! table, which stores one OAuth credential per (user, provider) pair.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// IntegrationToken entity representing a user's OAuth credential for one provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integration_tokens")]
pub struct Model {
    /// Unique identifier for the token row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Slug of the provider this credential belongs to (e.g., "fitbit")
    pub provider_slug: String,

    /// Current access token
    pub access_token: String,

    /// Long-lived refresh token, absent for providers that never issued one
    pub refresh_token: Option<String>,

    /// Absolute access-token expiry. NULL means a legacy non-expiring token,
    /// which downstream logic treats as always valid.
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// OAuth scopes granted at authorization time
    pub scope: Option<String>,

    /// Set when the provider reported the refresh token itself is dead;
    /// the row must not be used until a human re-authorizes.
    pub needs_reconnection: bool,

    /// Timestamp when the credential was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the credential was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

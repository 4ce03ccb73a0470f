//! Migration to create the integration_tokens table.
//!
//! One row per (user, provider) OAuth credential. Refreshes mutate the row in
//! place; the unique index backs the keyed upsert used by the token repository.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IntegrationTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntegrationTokens::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IntegrationTokens::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(IntegrationTokens::ProviderSlug)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::AccessToken)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IntegrationTokens::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(IntegrationTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(IntegrationTokens::Scope).text().null())
                    .col(
                        ColumnDef::new(IntegrationTokens::NeedsReconnection)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_integration_tokens_user_provider")
                    .table(IntegrationTokens::Table)
                    .col(IntegrationTokens::UserId)
                    .col(IntegrationTokens::ProviderSlug)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IntegrationTokens::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IntegrationTokens {
    Table,
    Id,
    UserId,
    ProviderSlug,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    Scope,
    NeedsReconnection,
    CreatedAt,
    UpdatedAt,
}

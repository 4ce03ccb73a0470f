//! Migration to create the reports table.
//!
//! Report content is collaborator-owned and stored opaquely; the unique
//! (user_id, report_date, kind) index is what makes report generation
//! idempotent under replayed jobs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reports::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Reports::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Reports::UserId).uuid().not_null())
                    .col(ColumnDef::new(Reports::ReportDate).date().not_null())
                    .col(ColumnDef::new(Reports::Kind).text().not_null())
                    .col(ColumnDef::new(Reports::Content).json_binary().not_null())
                    .col(
                        ColumnDef::new(Reports::CreatedAt)
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
                    .name("idx_reports_user_date_kind")
                    .table(Reports::Table)
                    .col(Reports::UserId)
                    .col(Reports::ReportDate)
                    .col(Reports::Kind)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reports::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Reports {
    Table,
    Id,
    UserId,
    ReportDate,
    Kind,
    Content,
    CreatedAt,
}

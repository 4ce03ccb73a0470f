//! Migration to create the email_log table.
//!
//! Entries are created in `pending` state before a send attempt and updated to
//! a terminal status afterward; a `sent` entry gates re-sends on retried jobs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmailLog::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(EmailLog::UserId).uuid().not_null())
                    .col(ColumnDef::new(EmailLog::RecipientEmail).text().not_null())
                    .col(ColumnDef::new(EmailLog::ReportKind).text().not_null())
                    .col(ColumnDef::new(EmailLog::ReportDate).date().not_null())
                    .col(
                        ColumnDef::new(EmailLog::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(EmailLog::MessageId).text().null())
                    .col(ColumnDef::new(EmailLog::Error).text().null())
                    .col(
                        ColumnDef::new(EmailLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailLog::UpdatedAt)
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
                    .name("idx_email_log_user_date_kind")
                    .table(EmailLog::Table)
                    .col(EmailLog::UserId)
                    .col(EmailLog::ReportDate)
                    .col(EmailLog::ReportKind)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum EmailLog {
    Table,
    Id,
    UserId,
    RecipientEmail,
    ReportKind,
    ReportDate,
    Status,
    MessageId,
    Error,
    CreatedAt,
    UpdatedAt,
}

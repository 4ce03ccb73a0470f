//! Email log repository
//!
//! Gates report email dispatch: a `sent` entry for a (user, kind, date)
//! identity means the email has already gone out and must not be re-sent.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::email_log::{self, Column, Entity as EmailLog, STATUS_FAILED, STATUS_PENDING,
    STATUS_SENT};

/// Repository for email log database operations
#[derive(Debug, Clone)]
pub struct EmailLogRepository {
    pub db: Arc<DatabaseConnection>,
}

impl EmailLogRepository {
    /// Creates a new EmailLogRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a sent entry for the report identity, if the email already went out.
    pub async fn find_sent(
        &self,
        user_id: Uuid,
        report_kind: &str,
        report_date: NaiveDate,
    ) -> Result<Option<email_log::Model>> {
        let row = EmailLog::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ReportKind.eq(report_kind))
            .filter(Column::ReportDate.eq(report_date))
            .filter(Column::Status.eq(STATUS_SENT))
            .one(self.db.as_ref())
            .await?;
        Ok(row)
    }

    /// Record a pending entry before attempting the send.
    pub async fn create_pending(
        &self,
        user_id: Uuid,
        recipient_email: &str,
        report_kind: &str,
        report_date: NaiveDate,
    ) -> Result<email_log::Model> {
        let now = Utc::now();
        let model = email_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            recipient_email: Set(recipient_email.to_string()),
            report_kind: Set(report_kind.to_string()),
            report_date: Set(report_date),
            status: Set(STATUS_PENDING.to_string()),
            message_id: Set(None),
            error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let row = model.insert(self.db.as_ref()).await?;
        Ok(row)
    }

    /// Mark an entry sent with the provider-assigned message id.
    pub async fn mark_sent(&self, entry_id: Uuid, message_id: &str) -> Result<()> {
        let model = email_log::ActiveModel {
            id: Set(entry_id),
            status: Set(STATUS_SENT.to_string()),
            message_id: Set(Some(message_id.to_string())),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };

        model.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Mark an entry failed with the send error.
    pub async fn mark_failed(&self, entry_id: Uuid, error: &str) -> Result<()> {
        let model = email_log::ActiveModel {
            id: Set(entry_id),
            status: Set(STATUS_FAILED.to_string()),
            error: Set(Some(error.to_string())),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };

        model.update(self.db.as_ref()).await?;
        Ok(())
    }
}

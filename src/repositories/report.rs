//! Report repository
//!
//! The reports table carries a unique index on (user_id, report_date, kind);
//! `insert_or_existing` absorbs the unique violation raised when two workers
//! race on the same identity and returns the surviving row.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::report::{self, Column, Entity as Report};

/// Repository for report database operations
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ReportRepository {
    /// Creates a new ReportRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a report by its (user, date, kind) identity.
    pub async fn find_by_identity(
        &self,
        user_id: Uuid,
        report_date: NaiveDate,
        kind: &str,
    ) -> Result<Option<report::Model>> {
        let row = Report::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ReportDate.eq(report_date))
            .filter(Column::Kind.eq(kind))
            .one(self.db.as_ref())
            .await?;
        Ok(row)
    }

    /// Insert a report, resolving identity races in favor of the row that
    /// won the insert.
    pub async fn insert_or_existing(
        &self,
        user_id: Uuid,
        report_date: NaiveDate,
        kind: &str,
        content: JsonValue,
    ) -> Result<report::Model> {
        let model = report::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            report_date: Set(report_date),
            kind: Set(kind.to_string()),
            content: Set(content),
            created_at: Set(Utc::now().into()),
        };

        match model.insert(self.db.as_ref()).await {
            Ok(row) => Ok(row),
            Err(err) if is_unique_violation(&err) => {
                tracing::debug!(
                    %user_id,
                    %report_date,
                    kind,
                    "Report insert lost identity race, returning existing row"
                );
                self.find_by_identity(user_id, report_date, kind)
                    .await?
                    .ok_or_else(|| err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

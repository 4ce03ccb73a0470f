//! Report entity model
//!
//! The content column is collaborator-owned and opaque to this service; the
//! (user_id, report_date, kind) identity is what the duplicate guard keys on.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Report entity representing one generated wellness report
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    /// Unique identifier for the report (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Target date the report covers
    pub report_date: Date,

    /// Report kind ("daily" or "weekly")
    pub kind: String,

    /// Opaque generated report document
    #[sea_orm(column_type = "JsonBinary")]
    pub content: JsonValue,

    /// Timestamp when the report was persisted
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

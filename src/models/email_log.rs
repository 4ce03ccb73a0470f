//! EmailLogEntry entity model
//!
//! Tracks the dispatch state of each report email so a retried job never
//! double-sends.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Dispatch status values for the email log.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SENT: &str = "sent";
pub const STATUS_FAILED: &str = "failed";

/// EmailLogEntry entity representing one attempted report email
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "email_log")]
pub struct Model {
    /// Unique identifier for the log entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Address the report was sent to
    pub recipient_email: String,

    /// Report kind ("daily" or "weekly")
    pub report_kind: String,

    /// Target date of the report the email carries
    pub report_date: Date,

    /// pending | sent | failed
    pub status: String,

    /// Provider-assigned message id, present once sent
    pub message_id: Option<String>,

    /// Error string for failed sends
    pub error: Option<String>,

    /// Timestamp when the entry was created (before the send attempt)
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the entry was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

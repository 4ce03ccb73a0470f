//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Wellness
//! Reports API.

pub mod jobs;
pub mod webhooks;

use axum::response::Json;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::ServiceInfo;
use crate::queue::ReportType;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Deterministic job id for a report identity.
///
/// Submissions that omit a job id get this one, so a cron that fires twice
/// for the same identity deduplicates naturally.
pub(crate) fn default_job_id(report_type: ReportType, user_id: Uuid, date: NaiveDate) -> String {
    format!("{}-{}-{}", report_type.as_str(), user_id, date)
}

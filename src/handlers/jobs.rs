//! Report job submission and status endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::default_job_id;
use crate::error::{ApiError, validation_error};
use crate::queue::{EnqueueAck, JobStatus, ReportJob, ReportType};
use crate::server::AppState;

/// Request body for submitting a report job.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    /// User the report is generated for
    pub user_id: Uuid,
    /// Address the finished report is mailed to
    pub user_email: String,
    /// Report cadence
    pub report_type: ReportType,
    /// Target date; defaults to today (UTC)
    pub date: Option<NaiveDate>,
    /// Idempotency key; defaults to `{kind}-{user_id}-{date}`
    pub job_id: Option<String>,
}

/// Response for a job submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: String,
    /// accepted | duplicate | rejected
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Response for a job status lookup.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub(crate) fn validate_submission(request: &SubmitJobRequest) -> Result<(), ApiError> {
    if request.user_email.trim().is_empty() || !request.user_email.contains('@') {
        return Err(validation_error(
            "Invalid job submission",
            serde_json::json!({ "user_email": "must be a valid email address" }),
        ));
    }

    if let Some(job_id) = &request.job_id {
        if job_id.trim().is_empty() || job_id.len() > 255 {
            return Err(validation_error(
                "Invalid job submission",
                serde_json::json!({ "job_id": "must be between 1 and 255 characters" }),
            ));
        }
    }

    Ok(())
}

/// Submit a report generation job
#[utoipa::path(
    post,
    path = "/jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 202, description = "Job accepted, deduplicated or rejected", body = SubmitJobResponse),
        (status = 400, description = "Invalid submission", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "jobs"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    validate_submission(&request)?;

    let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
    let job_id = request
        .job_id
        .clone()
        .unwrap_or_else(|| default_job_id(request.report_type, request.user_id, date));

    // Reject up front when the user has no integrations at all; a report for
    // them could never contain data.
    if !state.tokens.has_valid_integrations(request.user_id).await? {
        info!(job_id = %job_id, user_id = %request.user_id, "Rejecting job for user without integrations");
        return Ok((
            StatusCode::ACCEPTED,
            Json(SubmitJobResponse {
                job_id,
                status: "rejected".to_string(),
                reason: Some("no integrations connected".to_string()),
            }),
        ));
    }

    let job = ReportJob {
        job_id: job_id.clone(),
        user_id: request.user_id,
        user_email: request.user_email,
        report_type: request.report_type,
        date,
    };

    let response = match state.queue.enqueue(job) {
        EnqueueAck::Accepted => SubmitJobResponse {
            job_id,
            status: "accepted".to_string(),
            reason: None,
        },
        EnqueueAck::Duplicate => SubmitJobResponse {
            job_id,
            status: "duplicate".to_string(),
            reason: Some("already processed".to_string()),
        },
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Look up the state of a submitted job
#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job identifier")
    ),
    responses(
        (status = 200, description = "Job state", body = JobStatusResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Unknown job id", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "jobs"
)]
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let Some(job_state) = state.queue.status(&job_id) else {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("No job found with id '{}'", job_id),
        ));
    };

    Ok(Json(JobStatusResponse {
        job_id,
        status: job_state.status,
        attempts: job_state.attempts,
        reason: job_state.reason,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> SubmitJobRequest {
        SubmitJobRequest {
            user_id: Uuid::new_v4(),
            user_email: "user@example.com".to_string(),
            report_type: ReportType::Daily,
            date: None,
            job_id: None,
        }
    }

    #[test]
    fn test_valid_submission_passes() {
        assert!(validate_submission(&valid_request()).is_ok());
    }

    #[test]
    fn test_empty_email_rejected() {
        let request = SubmitJobRequest {
            user_email: "  ".to_string(),
            ..valid_request()
        };
        assert!(validate_submission(&request).is_err());
    }

    #[test]
    fn test_email_without_at_rejected() {
        let request = SubmitJobRequest {
            user_email: "not-an-email".to_string(),
            ..valid_request()
        };
        assert!(validate_submission(&request).is_err());
    }

    #[test]
    fn test_blank_job_id_rejected() {
        let request = SubmitJobRequest {
            job_id: Some("   ".to_string()),
            ..valid_request()
        };
        assert!(validate_submission(&request).is_err());
    }
}

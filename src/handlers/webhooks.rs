//! Scheduler webhook ingestion.
//!
//! External schedulers trigger report generation through this endpoint. The
//! HMAC signature is verified over the raw body before any parsing happens;
//! an unverified payload is never deserialized.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::default_job_id;
use crate::error::{ApiError, signature_invalid, validation_error};
use crate::queue::{EnqueueAck, ReportJob, ReportType};
use crate::server::AppState;
use crate::webhook_signature::{self, SIGNATURE_HEADER};

/// Signed trigger payload posted by the report scheduler.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportTrigger {
    pub user_id: Uuid,
    pub user_email: String,
    pub report_type: ReportType,
    /// Target date; defaults to today (UTC)
    pub date: Option<NaiveDate>,
    /// Idempotency key; defaults to `{kind}-{user_id}-{date}`
    pub job_id: Option<String>,
    /// Unix timestamp (seconds) when the trigger was signed
    pub timestamp: u64,
}

/// Response for an accepted trigger.
#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerAcceptedResponse {
    pub job_id: String,
    /// accepted | duplicate
    pub status: String,
}

/// Receive a signed report trigger
#[utoipa::path(
    post,
    path = "/webhooks/reports",
    request_body(content = ReportTrigger, description = "Signed report trigger", content_type = "application/json"),
    params(
        ("X-Reports-Signature" = String, Header, description = "HMAC-SHA256 signature of the request body (hex string with sha256= prefix)")
    ),
    responses(
        (status = 202, description = "Trigger accepted", body = TriggerAcceptedResponse),
        (status = 400, description = "Malformed trigger payload", body = ApiError),
        (status = 401, description = "Signature verification failed", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_report_trigger(
    State(state): State<AppState>,
    request: Request,
) -> Result<(StatusCode, Json<TriggerAcceptedResponse>), ApiError> {
    let (parts, body) = request.into_parts();

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body_bytes = axum::body::to_bytes(body, usize::MAX).await.map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Failed to read request body",
        )
    })?;

    // Signature first: nothing below runs for an unauthenticated payload.
    webhook_signature::verify_with_rotation(&state.config, &body_bytes, &signature)
        .map_err(|err| signature_invalid(&err.to_string()))?;

    let trigger: ReportTrigger = serde_json::from_slice(&body_bytes).map_err(|err| {
        validation_error(
            "Malformed trigger payload",
            serde_json::json!({ "body": err.to_string() }),
        )
    })?;

    webhook_signature::check_timestamp(trigger.timestamp, state.config.webhook_tolerance_seconds)
        .map_err(|err| signature_invalid(&err.to_string()))?;

    if trigger.user_email.trim().is_empty() || !trigger.user_email.contains('@') {
        return Err(validation_error(
            "Malformed trigger payload",
            serde_json::json!({ "user_email": "must be a valid email address" }),
        ));
    }

    let date = trigger.date.unwrap_or_else(|| Utc::now().date_naive());
    let job_id = trigger
        .job_id
        .clone()
        .unwrap_or_else(|| default_job_id(trigger.report_type, trigger.user_id, date));

    let job = ReportJob {
        job_id: job_id.clone(),
        user_id: trigger.user_id,
        user_email: trigger.user_email,
        report_type: trigger.report_type,
        date,
    };

    let status = match state.queue.enqueue(job) {
        EnqueueAck::Accepted => "accepted",
        EnqueueAck::Duplicate => "duplicate",
    };

    info!(job_id = %job_id, status, "Report trigger processed");

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerAcceptedResponse {
            job_id,
            status: status.to_string(),
        }),
    ))
}

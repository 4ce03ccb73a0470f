//! HTTP surface tests: webhook signature enforcement and operator auth.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use serde_json::{Value as JsonValue, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use reports::config::{AppConfig, QueueConfig};
use reports::providers::Registry;
use reports::queue::{JobError, JobHandler, JobOutcome, ReportJob, ReportQueue};
use reports::repositories::TokenRepository;
use reports::server::{AppState, create_app};
use reports::tokens::TokenLifecycle;
use reports::webhook_signature::sign_body;

mod test_utils;
use test_utils::{insert_token, setup_test_db};

const OPERATOR_TOKEN: &str = "test-operator-token";
const SIGNING_KEY: &str = "current-signing-key";
const NEXT_SIGNING_KEY: &str = "next-signing-key";

struct NoopHandler;

#[async_trait]
impl JobHandler for NoopHandler {
    async fn handle(&self, _job: &ReportJob) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::Completed)
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        webhook_signing_key: Some(SIGNING_KEY.to_string()),
        webhook_signing_key_next: Some(NEXT_SIGNING_KEY.to_string()),
        ..AppConfig::default()
    }
}

async fn build_app(db: DatabaseConnection) -> (Router, AppState) {
    let config = Arc::new(test_config());
    let registry = Arc::new(Registry::empty());
    let tokens = Arc::new(TokenLifecycle::new(
        TokenRepository::new(Arc::new(db.clone())),
        registry,
    ));
    let queue = ReportQueue::new(
        Arc::new(NoopHandler),
        QueueConfig::default(),
        CancellationToken::new(),
    );

    let state = AppState {
        db,
        config,
        queue,
        tokens,
    };

    (create_app(state.clone()), state)
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn trigger_payload(job_id: &str, timestamp: u64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "user_id": Uuid::new_v4(),
        "user_email": "user@example.com",
        "report_type": "daily",
        "date": "2025-11-20",
        "job_id": job_id,
        "timestamp": timestamp
    }))
    .unwrap()
}

fn signed_trigger(body: &[u8], signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/reports")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Reports-Signature", signature)
        .body(Body::from(body.to_vec()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> JsonValue {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_invalid_signature_rejected_without_side_effects() {
    let db = setup_test_db().await.unwrap();
    let (app, state) = build_app(db).await;

    let body = trigger_payload("wh-job-1", now_epoch());
    let signature = sign_body(&body, "wrong-key");

    let response = app.oneshot(signed_trigger(&body, &signature)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["code"], "SIGNATURE_INVALID");

    // The payload was never parsed, so no job was enqueued.
    assert!(state.queue.status("wh-job-1").is_none());
}

#[tokio::test]
async fn test_valid_signature_enqueues_job() {
    let db = setup_test_db().await.unwrap();
    let (app, state) = build_app(db).await;

    let body = trigger_payload("wh-job-2", now_epoch());
    let signature = sign_body(&body, SIGNING_KEY);

    let response = app.oneshot(signed_trigger(&body, &signature)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let payload = response_json(response).await;
    assert_eq!(payload["status"], "accepted");
    assert_eq!(payload["job_id"], "wh-job-2");

    assert!(state.queue.status("wh-job-2").is_some());
}

#[tokio::test]
async fn test_next_signing_key_accepted_during_rotation() {
    let db = setup_test_db().await.unwrap();
    let (app, _state) = build_app(db).await;

    let body = trigger_payload("wh-job-3", now_epoch());
    let signature = sign_body(&body, NEXT_SIGNING_KEY);

    let response = app.oneshot(signed_trigger(&body, &signature)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_replayed_trigger_acknowledged_as_duplicate() {
    let db = setup_test_db().await.unwrap();
    let (app, _state) = build_app(db).await;

    let body = trigger_payload("wh-job-4", now_epoch());
    let signature = sign_body(&body, SIGNING_KEY);

    let first = app
        .clone()
        .oneshot(signed_trigger(&body, &signature))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(response_json(first).await["status"], "accepted");

    let second = app.oneshot(signed_trigger(&body, &signature)).await.unwrap();
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    assert_eq!(response_json(second).await["status"], "duplicate");
}

#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let db = setup_test_db().await.unwrap();
    let (app, _state) = build_app(db).await;

    let body = trigger_payload("wh-job-5", now_epoch() - 3600);
    let signature = sign_body(&body, SIGNING_KEY);

    let response = app.oneshot(signed_trigger(&body, &signature)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_job_submission_requires_bearer_token() {
    let db = setup_test_db().await.unwrap();
    let (app, _state) = build_app(db).await;

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "user_id": Uuid::new_v4(),
                "user_email": "user@example.com",
                "report_type": "daily"
            }))
            .unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_job_submission_rejected_for_user_without_integrations() {
    let db = setup_test_db().await.unwrap();
    let (app, _state) = build_app(db).await;

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", OPERATOR_TOKEN))
        .body(Body::from(
            serde_json::to_vec(&json!({
                "user_id": Uuid::new_v4(),
                "user_email": "user@example.com",
                "report_type": "daily"
            }))
            .unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let payload = response_json(response).await;
    assert_eq!(payload["status"], "rejected");
    assert_eq!(payload["reason"], "no integrations connected");
}

#[tokio::test]
async fn test_job_submission_accepted_and_status_queryable() {
    let db = setup_test_db().await.unwrap();
    let db_arc = Arc::new(db.clone());
    let (app, _state) = build_app(db).await;

    let user_id = Uuid::new_v4();
    insert_token(&db_arc, user_id, "spotify", Some("refresh"), None)
        .await
        .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", OPERATOR_TOKEN))
        .body(Body::from(
            serde_json::to_vec(&json!({
                "user_id": user_id,
                "user_email": "user@example.com",
                "report_type": "daily",
                "date": "2025-11-20",
                "job_id": "api-job-1"
            }))
            .unwrap(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response_json(response).await["status"], "accepted");

    let status_request = Request::builder()
        .method("GET")
        .uri("/jobs/api-job-1")
        .header(header::AUTHORIZATION, format!("Bearer {}", OPERATOR_TOKEN))
        .body(Body::empty())
        .unwrap();

    let status_response = app.oneshot(status_request).await.unwrap();
    assert_eq!(status_response.status(), StatusCode::OK);

    let payload = response_json(status_response).await;
    assert_eq!(payload["job_id"], "api-job-1");
    assert!(payload["status"].is_string());
}

#[tokio::test]
async fn test_unknown_job_status_is_not_found() {
    let db = setup_test_db().await.unwrap();
    let (app, _state) = build_app(db).await;

    let request = Request::builder()
        .method("GET")
        .uri("/jobs/missing-job")
        .header(header::AUTHORIZATION, format!("Bearer {}", OPERATOR_TOKEN))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

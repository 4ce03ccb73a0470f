//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Wellness
//! Reports API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::queue::ReportQueue;
use crate::tokens::TokenLifecycle;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub queue: Arc<ReportQueue>,
    pub tokens: Arc<TokenLifecycle>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    // Operator surface: job submission and status require a bearer token.
    let operator_routes = Router::new()
        .route("/jobs", post(handlers::jobs::submit_job))
        .route("/jobs/{job_id}", get(handlers::jobs::job_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Webhook surface authenticates via body signature instead.
    let webhook_routes = Router::new().route(
        "/webhooks/reports",
        post(handlers::webhooks::receive_report_trigger),
    );

    Router::new()
        .route("/", get(handlers::root))
        .merge(operator_routes)
        .merge(webhook_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::clone(&state.config);
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::jobs::submit_job,
        crate::handlers::jobs::job_status,
        crate::handlers::webhooks::receive_report_trigger,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::jobs::SubmitJobRequest,
            crate::handlers::jobs::SubmitJobResponse,
            crate::handlers::jobs::JobStatusResponse,
            crate::handlers::webhooks::ReportTrigger,
            crate::handlers::webhooks::TriggerAcceptedResponse,
            crate::queue::ReportType,
            crate::queue::JobStatus,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Wellness Reports API",
        description = "Token lifecycle management and idempotent report generation",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

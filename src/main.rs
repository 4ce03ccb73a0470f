//! # Wellness Reports API Main Entry Point

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;

use reports::config::ConfigLoader;
use reports::generator::DefaultReportGenerator;
use reports::mail::HttpMailer;
use reports::orchestrator::ReportOrchestrator;
use reports::providers::Registry;
use reports::queue::ReportQueue;
use reports::repositories::{EmailLogRepository, ReportRepository, TokenRepository};
use reports::server::{AppState, run_server};
use reports::tokens::TokenLifecycle;
use reports::{db, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    config.validate()?;

    telemetry::init_tracing(&config);

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(profile = %config.profile, "Loaded configuration: {}", redacted_json);
    }

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let db_arc = Arc::new(db.clone());
    let config = Arc::new(config);

    let registry = Arc::new(Registry::from_config(&config));
    let token_repo = TokenRepository::new(Arc::clone(&db_arc));
    let tokens = Arc::new(TokenLifecycle::new(token_repo, Arc::clone(&registry)));

    let orchestrator = ReportOrchestrator::new(
        Arc::clone(&tokens),
        registry,
        ReportRepository::new(Arc::clone(&db_arc)),
        EmailLogRepository::new(Arc::clone(&db_arc)),
        Arc::new(DefaultReportGenerator),
        Arc::new(HttpMailer::from_config(&config)),
    );

    let shutdown = CancellationToken::new();
    let queue = ReportQueue::new(
        Arc::new(orchestrator),
        config.queue.clone(),
        shutdown.clone(),
    );

    let state = AppState {
        db,
        config,
        queue,
        tokens,
    };

    // Propagate Ctrl-C into graceful shutdown of the server and queue.
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl_c_shutdown.cancel();
        }
    });

    run_server(state, shutdown).await
}

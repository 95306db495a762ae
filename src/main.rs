//! AgriSmart - farm advisory dashboard backend
//!
//! Serves the assistant chat and the plant disease triage engines over HTTP,
//! one pair of engines per dashboard session.

mod api;
mod config;
mod error;
mod intent;
mod model;
mod runtime;
mod service;
mod state_machine;

use api::{create_router, AppState};
use config::AdvisorConfig;
use intent::IntentTable;
use runtime::SessionManager;
use service::{
    DiagnosisService, KeywordReplyService, LoggingDiagnosisService, LoggingReplyService,
    MockDiagnosisService, ReplyService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrismart=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AdvisorConfig::from_env();
    tracing::info!(
        reply_delay_ms = u64::try_from(config.reply_delay.as_millis()).unwrap_or(u64::MAX),
        analysis_delay_ms = u64::try_from(config.analysis_delay.as_millis()).unwrap_or(u64::MAX),
        max_image_bytes = config.max_image_bytes,
        recent_detections = config.recent_detections,
        session_idle_secs = config.session_idle_timeout.as_secs(),
        "Configuration loaded"
    );

    // Advisory services
    let reply_service: Arc<dyn ReplyService> = Arc::new(LoggingReplyService::new(Arc::new(
        KeywordReplyService::new(Arc::new(IntentTable::agriculture())),
    )));
    let diagnosis_service: Arc<dyn DiagnosisService> = Arc::new(LoggingDiagnosisService::new(
        Arc::new(MockDiagnosisService::leaf_spot()),
    ));

    let port = config.port;
    let sessions = Arc::new(SessionManager::new(
        config,
        reply_service,
        diagnosis_service,
    ));
    let sweeper = sessions.spawn_idle_sweeper();
    let state = AppState::new(sessions.clone());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("AgriSmart server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    sessions.close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pau_core::scripting::ProcessRunner;
use pau_pipeline::submission::SubmissionPipeline;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pau_api::config::ServerConfig;
use pau_api::router::build_app_router;
use pau_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pau_api=debug,pau_pipeline=debug,pau_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        upload_dir = %config.pipeline.upload_dir.display(),
        record_dir = %config.pipeline.record_dir.display(),
        writer_dir = %config.pipeline.writer_dir.display(),
        reporter_context = %config.pipeline.reporter_context_dir.display(),
        timeout_secs = config.pipeline.process_timeout.as_secs(),
        "Loaded pipeline configuration",
    );

    // --- Pipeline ---
    let pipeline = SubmissionPipeline::new(
        Arc::new(config.pipeline.clone()),
        Arc::new(ProcessRunner),
    );
    let submissions = TaskTracker::new();

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        submissions: submissions.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        in_flight = submissions.len(),
        "Server stopped accepting connections, waiting for running submissions"
    );
    submissions.close();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, submissions.wait()).await.is_err() {
        tracing::warn!(
            in_flight = submissions.len(),
            "Shutdown grace period elapsed with submissions still running"
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cranewatch_api::config::ServerConfig;
use cranewatch_api::router::build_app_router;
use cranewatch_api::state::AppState;
use cranewatch_pipeline::config::PipelineConfig;
use cranewatch_pipeline::persistence::{AssetSink, JsonlSink, NoopSink};
use cranewatch_pipeline::Pipeline;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cranewatch_api=debug,cranewatch_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(
        queue_capacity = pipeline_config.queue_capacity,
        history_capacity = pipeline_config.history_capacity,
        io_services = ?pipeline_config.io_services,
        "Loaded pipeline configuration"
    );

    // --- Persistence ---
    let sink: Arc<dyn AssetSink> = match &pipeline_config.persist_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Persisting committed batches as JSON lines");
            Arc::new(JsonlSink::new(path.clone()))
        }
        None => Arc::new(NoopSink),
    };

    // --- Pipeline ---
    let pipeline = Pipeline::start(&pipeline_config, sink);

    // --- App state + router ---
    let state = AppState::new(config.clone(), &pipeline);
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
    tracing::info!("Server stopped accepting connections, stopping pipeline");

    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(timeout, pipeline.shutdown()).await {
        Ok(Ok(stats)) => tracing::info!(?stats, "Pipeline shut down"),
        Ok(Err(e)) => tracing::error!(error = %e, "Pipeline task failed during shutdown"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Pipeline did not stop within the shutdown timeout"
        ),
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

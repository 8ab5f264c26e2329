use std::net::SocketAddr;
use std::time::Duration;

use docconv_api::config::ServerConfig;
use docconv_api::router::build_app_router;
use docconv_api::state::AppState;
use docconv_pipeline::backends::Backends;
use docconv_pipeline::config::PipelineConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown waits for embedded workers to finish their units.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(150);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "docconv_api=debug,docconv_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let pipeline_config = PipelineConfig::from_env().expect("Invalid pipeline configuration");

    // --- Backends (job store, blobs, barrier, queue) ---
    let backends = Backends::connect(&pipeline_config)
        .await
        .expect("Failed to connect pipeline backends");
    tracing::info!("Database connected and migrations applied");

    // --- Embedded workers ---
    // The in-process queue is only reachable from this process, and died
    // with the previous one.
    if pipeline_config.embedded_workers() {
        if let Err(e) = backends.fail_interrupted_jobs().await {
            tracing::error!(error = %e, "Failed to settle jobs interrupted by a restart");
        }
    }
    let worker_cancel = CancellationToken::new();
    let worker_handle = pipeline_config.embedded_workers().then(|| {
        docconv_worker::spawn_workers(&backends, &pipeline_config, worker_cancel.clone())
    });

    // --- Router ---
    let state = AppState::new(config.clone(), backends);
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
    tracing::info!("Server stopped accepting connections, cleaning up");

    if let Some(handle) = worker_handle {
        worker_cancel.cancel();
        match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, handle).await {
            Ok(_) => tracing::info!("Embedded workers stopped"),
            Err(_) => tracing::warn!("Embedded workers did not stop in time"),
        }
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

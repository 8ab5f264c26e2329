use anyhow::{bail, Context};
use docconv_pipeline::backends::Backends;
use docconv_pipeline::config::PipelineConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docconv_worker=debug,docconv_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    if config.embedded_workers() {
        bail!("BROKER_URL is memory://; the standalone worker needs a postgres:// broker");
    }

    let backends = Backends::connect(&config)
        .await
        .context("Failed to connect pipeline backends")?;

    let cancel = CancellationToken::new();
    let pool = docconv_worker::spawn_workers(&backends, &config, cancel.clone());

    shutdown_signal().await?;
    tracing::info!("Shutdown requested, finishing units in hand");
    cancel.cancel();
    pool.await.context("Worker pool task failed")?;

    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received SIGINT (Ctrl-C)");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        tracing::info!("Received SIGINT (Ctrl-C)");
    }

    Ok(())
}

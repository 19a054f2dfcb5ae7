mod cleanup;
mod config;
mod error;
mod gateway;
mod routes;

use std::sync::Arc;

use tracing::info;

use mosaic_transfer::{BroadcastPublisher, TransferRegistry};

use crate::config::ServerConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosaic=debug,mosaic_transfer=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let events = Arc::new(BroadcastPublisher::new(config.event_buffer));
    let registry = TransferRegistry::new(config.registry_config(), events.clone());

    if let Some(idle) = config.idle_timeout {
        info!(
            "Idle eviction: {}s timeout, checked every {}s",
            idle.as_secs(),
            config.cleanup_interval.as_secs()
        );
        tokio::spawn(cleanup::run_eviction_loop(
            registry.clone(),
            config.cleanup_interval,
        ));
    }

    let app = routes::router(AppState { registry, events }, config.body_limit_bytes);

    let addr = config.addr()?;
    info!("Mosaic receiver listening on {}", addr);
    info!(
        "Retention: last {} files, body limit {} MB",
        config.retention,
        config.body_limit_bytes / (1024 * 1024)
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

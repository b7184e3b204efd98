// crates/server/src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use markbook_core::CommandScraper;
use markbook_server::{create_app, spawn_eviction_sweep, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("markbook=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let command = config
        .scraper_command
        .clone()
        .context("MARKBOOK_SCRAPER_CMD must be set to the automation command line")?;
    let scraper = CommandScraper::from_command_line(&command)
        .context("MARKBOOK_SCRAPER_CMD must not be empty")?;

    tokio::fs::create_dir_all(&config.spool_dir)
        .await
        .with_context(|| format!("creating spool directory {}", config.spool_dir.display()))?;

    let port = config.port;
    tracing::info!(
        workers = config.workers,
        job_timeout_secs = config.job_timeout.as_secs(),
        retention_secs = config.retention.as_secs(),
        spool_dir = %config.spool_dir.display(),
        "starting markbook"
    );

    let state = AppState::new(config, Arc::new(scraper));

    let shutdown = CancellationToken::new();
    spawn_eviction_sweep(Arc::clone(&state), shutdown.clone());

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app).await?;
    shutdown.cancel();
    Ok(())
}

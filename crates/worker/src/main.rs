//! cachette worker entry point.
//!
//! Boots the worker: load configuration, open the entry store, warm the
//! static generation, activate (unless configured to hold at waiting),
//! then serve the gateway until interrupted. Logging goes to stderr as
//! JSON.

use std::sync::Arc;

use anyhow::Result;
use cachette_client::{FetchConfig, HttpFetcher};
use cachette_core::{CacheDb, WorkerConfig};
use cachette_worker::gateway::{self, GatewayState};
use cachette_worker::{Worker, control};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = WorkerConfig::load()?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        listen = %config.listen,
        "starting cachette worker"
    );

    let cache = CacheDb::open(&config.db_path).await?;

    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        ..FetchConfig::default()
    };
    let fetcher = Arc::new(HttpFetcher::new(fetch_config)?);

    let origin = url::Url::parse(&config.origin)?;
    let skip_waiting = config.skip_waiting;
    let listen = config.listen.clone();

    let mut worker = Worker::new(config, cache, fetcher)?;
    let report = worker.install().await?;
    if !report.is_complete() {
        tracing::warn!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install completed with missing precache entries"
        );
    }

    let (handle, task) = control::spawn(worker);

    if skip_waiting {
        handle.skip_waiting().await?;
    } else {
        tracing::info!("holding at waiting until skip-waiting is requested");
    }

    let state = GatewayState { handle: handle.clone(), origin };
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(listen = %listen, "gateway listening");

    let shutdown_handle = handle.clone();
    axum::serve(listener, gateway::router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_handle.shutdown().await;
        })
        .await?;

    task.await?;

    Ok(())
}

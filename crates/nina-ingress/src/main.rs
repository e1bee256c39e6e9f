//! Binary entrypoint for the Nina Ingress.

use anyhow::{Context, Result};
use clap::Parser;
use nina_core::config::Config;
use nina_core::store::{RedisBackend, Store};
use nina_ingress::{build_router, run_refresher, IngressState, SnapshotCache};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nina-ingress", version, about = "Nina host-routing reverse proxy")]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log level: trace|debug|info|warn|error
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Log format: text|json
    #[arg(long, default_value = "text")]
    log_format: String,
    /// Enable verbose logging
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { &args.log_level };
    nina_core::logging::init(level, &args.log_format)?;

    info!("starting nina ingress");
    let cfg = Config::load(args.config.as_deref()).context("load configuration")?;

    let backend = RedisBackend::connect(&cfg.redis_url())
        .await
        .context("connect to redis")?;
    let store = Store::new(Arc::new(backend));
    info!(url = %cfg.redis_url(), "connected to store");

    let snapshot = Arc::new(SnapshotCache::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = tokio::spawn(run_refresher(
        store,
        snapshot.clone(),
        cfg.refresh_interval(),
        shutdown_rx,
    ));

    let state = IngressState::new(snapshot).context("build proxy client")?;
    let app = build_router(state);

    let addr: SocketAddr = cfg.ingress_addr().parse().context("parse ingress address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("bind ingress address")?;
    info!(%addr, refresh_interval = ?cfg.refresh_interval(), "ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal the refresher and join it before returning.
    let _ = shutdown_tx.send(true);
    if let Err(e) = refresher.await {
        error!(error = %e, "refresher task failed");
    }
    info!("ingress stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("install ctrl_c handler");
    info!("received shutdown signal");
}

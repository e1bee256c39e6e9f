//! Binary entrypoint for the Nina Engine.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use bollard::Docker;
use clap::Parser;
use nina_core::config::Config;
use nina_core::store::{RedisBackend, Store};
use nina_engine::telemetry::{normalize_path, HTTP_REQUESTS, HTTP_REQUEST_DURATION};
use nina_engine::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

// Build intake bodies carry whole source bundles.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "nina-engine", version, about = "Nina build and deploy control plane")]
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

    info!("starting nina engine");
    let cfg = Config::load(args.config.as_deref()).context("load configuration")?;

    let backend = RedisBackend::connect(&cfg.redis_url())
        .await
        .context("connect to redis")?;
    let store = Store::new(Arc::new(backend));
    info!(url = %cfg.redis_url(), "connected to store");

    let docker = Docker::connect_with_local_defaults().context("initialize docker client")?;
    info!("docker client initialized");

    let state = AppState::new(store, docker);
    let app = build_router(state)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn(track_metrics));

    let addr: SocketAddr = cfg.server_addr().parse().context("parse server address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("bind server address")?;
    info!(%addr, "engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("engine stopped");
    Ok(())
}

async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = normalize_path(req.uri().path());
    let start = std::time::Instant::now();
    let resp = next.run(req).await;
    let status = resp.status().as_u16().to_string();
    HTTP_REQUESTS.with_label_values(&[method.as_str(), path.as_str(), status.as_str()]).inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), path.as_str()])
        .observe(start.elapsed().as_secs_f64());
    resp
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("install ctrl_c handler");
    info!("received shutdown signal");
}

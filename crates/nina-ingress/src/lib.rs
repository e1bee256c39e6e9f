//! Nina Ingress: routes external HTTP traffic by host header to the
//! container replicas of the matching deployment, one uniformly random
//! replica per request.

pub mod snapshot;

pub use snapshot::{run_refresher, SnapshotCache};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::Router;
use futures_util::TryStreamExt;
use nina_core::types::Container;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Header carrying the chosen replica's container id to the backend.
pub const REPLICA_HEADER: &str = "X-Nina-Replica-Container-ID";

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
}

#[derive(Error, Debug)]
enum ProxyError {
    #[error("unsupported method: {0}")]
    Method(String),
    #[error("failed to read request body: {0}")]
    RequestBody(axum::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("failed to assemble response: {0}")]
    Response(#[from] axum::http::Error),
}

#[derive(Clone)]
pub struct IngressState {
    pub snapshot: Arc<SnapshotCache>,
    pub client: reqwest::Client,
}

impl IngressState {
    pub fn new(snapshot: Arc<SnapshotCache>) -> Result<Self, reqwest::Error> {
        Ok(Self { snapshot, client: proxy_client()? })
    }
}

/// Shared upstream connection pool for every proxied request.
pub fn proxy_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// The whole ingress surface is one catch-all handler; routing is by host.
pub fn build_router(state: IngressState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(State(state): State<IngressState>, req: Request) -> Response {
    let host = extract_host(&req);
    debug!(host = %host, path = %req.uri().path(), method = %req.method(), "received request");

    let Some(deployment) = state.snapshot.find(&host) else {
        warn!(host = %host, "unknown application");
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: "unknown_application", message: "unknown application" }),
        )
            .into_response();
    };

    let Some(container) = select_random_replica(&deployment.containers) else {
        error!(app_name = %deployment.app_name, "no available replicas");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse { error: "no_replicas_available", message: "no replicas available" }),
        )
            .into_response();
    };

    let target = format!("http://{}:{}", container.address, container.port);
    info!(
        host = %host,
        target = %target,
        container_id = %container.container_id,
        "routing request"
    );

    match proxy(&state.client, &container, req).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(host = %host, target = %target, error = %e, "proxy error");
            (StatusCode::BAD_GATEWAY, "proxy error").into_response()
        }
    }
}

/// Host from the `Host` header, port suffix stripped.
fn extract_host(req: &Request) -> String {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default();
    raw.split(':').next().unwrap_or_default().to_string()
}

/// Uniform random pick from the replica list using the system CSPRNG,
/// falling back to the first replica when the RNG fails.
fn select_random_replica(containers: &[Container]) -> Option<&Container> {
    if containers.is_empty() {
        return None;
    }
    let mut buf = [0u8; 8];
    let index = match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => (u64::from_le_bytes(buf) % containers.len() as u64) as usize,
        Err(_) => 0,
    };
    containers.get(index)
}

/// Forward the request to the chosen replica. The outbound host becomes
/// the target's, and the replica's container id travels along in
/// [`REPLICA_HEADER`].
async fn proxy(
    client: &reqwest::Client,
    container: &Container,
    req: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = format!("http://{}:{}{}", container.address, container.port, path_and_query);

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| ProxyError::Method(parts.method.to_string()))?;
    let mut outbound = client.request(method, &target);
    for (name, value) in parts.headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "host" || HOP_BY_HOP.contains(&lower.as_str()) {
            continue;
        }
        outbound = outbound.header(name.as_str(), value.as_bytes());
    }
    outbound = outbound.header(REPLICA_HEADER, container.container_id.as_str());

    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(ProxyError::RequestBody)?;
    let upstream = outbound.body(body_bytes).send().await?;

    let mut builder = Response::builder().status(upstream.status().as_u16());
    for (name, value) in upstream.headers() {
        if HOP_BY_HOP.contains(&name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
            builder = builder.header(name.as_str(), value);
        }
    }
    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    Ok(builder.body(Body::from_stream(stream))?)
}

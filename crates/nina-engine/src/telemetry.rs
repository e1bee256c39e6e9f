use axum::http::StatusCode;
use axum::response::IntoResponse;
use once_cell::sync::Lazy;
use prometheus::{opts, Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        opts!("http_requests_total", "HTTP request count"),
        &["method", "path", "status"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        prometheus::HistogramOpts::new("http_request_duration_seconds", "HTTP request latency"),
        &["method", "path"],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

/// Collapse id-bearing path segments so the label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    let mut out = Vec::new();
    for (i, seg) in path.split('/').enumerate() {
        let prev = out.last().copied().unwrap_or("");
        if i > 0 && !seg.is_empty() && matches!(prev, "builds" | "deployments") {
            out.push(":id");
        } else {
            out.push(seg);
        }
    }
    out.join("/")
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_collapses_ids() {
        assert_eq!(normalize_path("/api/v1/builds/abc123"), "/api/v1/builds/:id");
        assert_eq!(normalize_path("/api/v1/deployments/demo/status"), "/api/v1/deployments/:id/status");
        assert_eq!(normalize_path("/api/v1/builds"), "/api/v1/builds");
        assert_eq!(normalize_path("/health"), "/health");
    }
}

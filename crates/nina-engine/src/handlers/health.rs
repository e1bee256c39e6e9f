use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
    pub service: &'static str,
}

/// Liveness endpoint; performs no dependency checks.
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", timestamp: Utc::now(), service: "nina-engine" })
}

use crate::error::{ApiError, ApiResult};
use crate::{build, AppState};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nina_core::types::{Build, BuildRequest};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct BuildsQuery {
    pub commit_hash: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ListBuildsResponse {
    #[schema(value_type = Vec<Object>)]
    pub builds: Vec<Build>,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteBuildsResponse {
    pub deleted: Vec<String>,
    pub count: usize,
}

/// Accept a build: validate, persist the pending record, then hand the
/// heavy work to a detached task with its own deadline. The reply is the
/// intake record; callers poll `GET /builds?commit_hash=` for the result.
#[utoipa::path(
    post,
    path = "/api/v1/build",
    responses(
        (status = 201, description = "Build accepted; record returned with status pending"),
        (status = 400, body = crate::error::ApiErrorBody)
    )
)]
pub async fn create_build(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Build>)> {
    let req: BuildRequest = serde_json::from_slice(&body)
        .map_err(|e| {
            error!(error = %e, "invalid build request body");
            ApiError::bad_request("invalid request body")
        })?;
    if req.app_name.is_empty() || req.bundle_content.is_empty() {
        return Err(ApiError::bad_request("app name and bundle content are required"));
    }

    info!(app_name = %req.app_name, commit_hash = %req.commit_hash, "processing build request");
    let record = state.store.create_build(&req).await?;

    let background = state.clone();
    tokio::spawn(async move {
        build::run(background, req).await;
    });

    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/api/v1/builds",
    params(("commit_hash" = Option<String>, Query, description = "Filter by commit hash")),
    responses((status = 200, body = ListBuildsResponse))
)]
pub async fn list_builds(
    State(state): State<AppState>,
    Query(query): Query<BuildsQuery>,
) -> ApiResult<Json<ListBuildsResponse>> {
    let builds = match query.commit_hash.as_deref().filter(|s| !s.is_empty()) {
        Some(commit_hash) => state.store.list_builds_by_commit(commit_hash).await?,
        None => state.store.list_builds().await?,
    };
    let count = builds.len();
    Ok(Json(ListBuildsResponse { builds, count }))
}

/// Delete builds matching an app name or commit hash; reports the keys
/// that were removed.
#[utoipa::path(
    delete,
    path = "/api/v1/builds/{id}",
    params(("id" = String, Path, description = "App name or commit hash")),
    responses((status = 200, body = DeleteBuildsResponse), (status = 400, body = crate::error::ApiErrorBody))
)]
pub async fn delete_builds(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteBuildsResponse>> {
    if id.is_empty() {
        return Err(ApiError::bad_request("build id is required"));
    }
    let deleted = state.store.delete_builds_matching(&id).await?;
    let count = deleted.len();
    info!(id = %id, count, "deleted builds");
    Ok(Json(DeleteBuildsResponse { deleted, count }))
}

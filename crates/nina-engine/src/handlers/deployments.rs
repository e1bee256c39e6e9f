use crate::error::{ApiError, ApiResult};
use crate::{deploy, AppState};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nina_core::store::StoreError;
use nina_core::types::{BuildStatus, Deployment, DeploymentRequest};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct DeploymentsQuery {
    pub app_name: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ListDeploymentsResponse {
    #[schema(value_type = Vec<Object>)]
    pub deployments: Vec<Deployment>,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteDeploymentResponse {
    pub id: String,
    pub containers_removed: usize,
}

/// Accept a deployment: the referenced build must exist and be `built`.
/// Replica provisioning runs in a detached task; the reply is the record
/// with status `deploying`.
#[utoipa::path(
    post,
    path = "/api/v1/deploy",
    responses(
        (status = 201, description = "Deployment accepted; record returned with status deploying"),
        (status = 400, body = crate::error::ApiErrorBody)
    )
)]
pub async fn create_deployment(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    let req: DeploymentRequest = serde_json::from_slice(&body)
        .map_err(|e| {
            error!(error = %e, "invalid deployment request body");
            ApiError::bad_request("invalid request body")
        })?;
    if req.app_name.is_empty() || req.commit_hash.is_empty() {
        return Err(ApiError::bad_request("app name and commit hash are required"));
    }
    if req.replicas < 1 {
        return Err(ApiError::bad_request("replicas must be at least 1"));
    }

    info!(
        app_name = %req.app_name,
        commit_hash = %req.commit_hash,
        replicas = req.replicas,
        "processing deployment request"
    );

    let build = match state.store.get_build(&req.commit_hash).await {
        Ok(b) => b,
        Err(StoreError::NotFound(_)) => {
            return Err(ApiError::bad_request("no build found for the given commit hash"));
        }
        Err(e) => return Err(e.into()),
    };
    if build.status != BuildStatus::Built {
        return Err(ApiError::bad_request(format!(
            "build is not ready for deployment (status: {})",
            build.status
        )));
    }

    let deployment = state.store.create_deployment(&req, &build.repo_url).await?;

    let background = state.clone();
    let app_name = req.app_name.clone();
    let image_tag = build.image_tag.clone();
    let replicas = req.replicas;
    tokio::spawn(async move {
        deploy::run(background, app_name, image_tag, replicas).await;
    });

    Ok((StatusCode::CREATED, Json(deployment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/deployments",
    params(("app_name" = Option<String>, Query, description = "Filter by application name")),
    responses((status = 200, body = ListDeploymentsResponse))
)]
pub async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<DeploymentsQuery>,
) -> ApiResult<Json<ListDeploymentsResponse>> {
    let deployments = match query.app_name.as_deref().filter(|s| !s.is_empty()) {
        Some(app_name) => state.store.list_deployments_by_app(app_name).await?,
        None => state.store.list_deployments().await?,
    };
    let count = deployments.len();
    Ok(Json(ListDeploymentsResponse { deployments, count }))
}

/// `:id` is the application name, the deployment's business key.
#[utoipa::path(
    get,
    path = "/api/v1/deployments/{id}",
    params(("id" = String, Path, description = "Application name")),
    responses(
        (status = 200, description = "Deployment record"),
        (status = 404, body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deployment>> {
    match state.store.get_deployment(&id).await {
        Ok(d) => Ok(Json(d)),
        Err(StoreError::NotFound(_)) => Err(ApiError::not_found("deployment not found")),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/deployments/{id}/status",
    params(("id" = String, Path, description = "Application name")),
    responses(
        (status = 200, description = "Deployment record"),
        (status = 404, body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_deployment_status(
    state: State<AppState>,
    id: Path<String>,
) -> ApiResult<Json<Deployment>> {
    get_deployment(state, id).await
}

/// Remove a deployment: best-effort container removal, then the record.
#[utoipa::path(
    delete,
    path = "/api/v1/deployments/{id}",
    params(("id" = String, Path, description = "Application name")),
    responses(
        (status = 200, body = DeleteDeploymentResponse),
        (status = 404, body = crate::error::ApiErrorBody)
    )
)]
pub async fn delete_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteDeploymentResponse>> {
    let deployment = match state.store.get_deployment(&id).await {
        Ok(d) => d,
        Err(StoreError::NotFound(_)) => return Err(ApiError::not_found("deployment not found")),
        Err(e) => return Err(e.into()),
    };

    let containers_removed = deploy::remove_containers(&state.docker, &deployment.containers).await;
    state.store.delete_deployment(&id).await?;

    info!(id = %id, app_name = %deployment.app_name, containers_removed, "deployment deleted");
    Ok(Json(DeleteDeploymentResponse { id, containers_removed }))
}

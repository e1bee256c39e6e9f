//! Nina Engine: the build and deploy control plane. Exposes the HTTP API,
//! runs the build pipeline against the container runtime, and manages
//! container replicas for deployments.

pub mod build;
pub mod deploy;
pub mod error;
pub mod handlers;
pub mod telemetry;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bollard::Docker;
use build::Builder;
use nina_core::store::Store;
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::builds::create_build,
        handlers::builds::list_builds,
        handlers::builds::delete_builds,
        handlers::deployments::create_deployment,
        handlers::deployments::list_deployments,
        handlers::deployments::get_deployment,
        handlers::deployments::get_deployment_status,
        handlers::deployments::delete_deployment,
    ),
    components(schemas(
        handlers::health::HealthResponse,
        handlers::builds::ListBuildsResponse,
        handlers::builds::DeleteBuildsResponse,
        handlers::deployments::ListDeploymentsResponse,
        handlers::deployments::DeleteDeploymentResponse,
        error::ApiErrorBody,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Shared handler state. Everything here is a cheap clone: the store is an
/// `Arc` over its backend, the docker client is internally reference
/// counted, and the builder is wrapped explicitly.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub docker: Docker,
    pub builder: Arc<Builder>,
}

impl AppState {
    pub fn new(store: Store, docker: Docker) -> Self {
        Self { store, docker, builder: Arc::new(Builder::new()) }
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/build", post(handlers::builds::create_build))
        .route("/builds", get(handlers::builds::list_builds))
        .route("/builds/:id", delete(handlers::builds::delete_builds))
        .route("/deploy", post(handlers::deployments::create_deployment))
        .route("/deployments", get(handlers::deployments::list_deployments))
        .route(
            "/deployments/:id",
            get(handlers::deployments::get_deployment)
                .delete(handlers::deployments::delete_deployment),
        )
        .route("/deployments/:id/status", get(handlers::deployments::get_deployment_status));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(telemetry::metrics_handler))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", api)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use nina_core::types::{Build, BuildRequest, BuildStatus, Deployment, DeploymentStatus};
    use serde_json::{json, Value};
    use std::io::Write;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let docker = Docker::connect_with_local_defaults().expect("docker client");
        AppState::new(Store::in_memory(), docker)
    }

    fn tiny_bundle() -> String {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        let data = b"hello\n";
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "README", &data[..]).unwrap();
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&builder.into_inner().unwrap()).unwrap();
        BASE64.encode(gz.finish().unwrap())
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = build_router(test_state());
        let res = app.oneshot(get_req("/api-docs/openapi.json")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert!(v["openapi"].is_string());
        assert!(v["paths"]["/api/v1/build"].is_object());
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let app = build_router(test_state());
        let res = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["service"], "nina-engine");
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn build_rejects_malformed_body() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/build")
            .header("content-type", "application/json")
            .body(Body::from("{invalid"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "invalid request body");
    }

    #[tokio::test]
    async fn build_rejects_missing_fields() {
        let app = build_router(test_state());
        let res = app.oneshot(post("/api/v1/build", json!({}))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "app name and bundle content are required");
    }

    #[tokio::test]
    async fn build_intake_returns_pending_record_and_settles() {
        let state = test_state();
        let app = build_router(state.clone());
        let body = json!({
            "app_name": "demo",
            "commit_hash": "abc123",
            "bundle_content": tiny_bundle(),
        });
        let res = app.oneshot(post("/api/v1/build", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let record: Build = serde_json::from_value(body_json(res).await).unwrap();
        assert_eq!(record.status, BuildStatus::Pending);
        assert_eq!(record.commit_hash, "abc123");

        // The bundle is not a Go project, so the detached pipeline must
        // settle the record as failed.
        let mut status = record.status;
        for _ in 0..50 {
            status = state.store.get_build("abc123").await.unwrap().status;
            if status == BuildStatus::Failed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(status, BuildStatus::Failed);
        assert!(state.store.get_build("abc123").await.unwrap().finished_at.is_some());
    }

    #[tokio::test]
    async fn list_builds_is_empty_initially() {
        let app = build_router(test_state());
        let res = app.oneshot(get_req("/api/v1/builds")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["count"], 0);
        assert_eq!(v["builds"], json!([]));
    }

    #[tokio::test]
    async fn list_builds_filters_by_commit_hash() {
        let state = test_state();
        let req = BuildRequest { app_name: "demo".into(), commit_hash: "c1".into(), ..Default::default() };
        state.store.create_build(&req).await.unwrap();
        let req = BuildRequest { app_name: "demo".into(), commit_hash: "c2".into(), ..Default::default() };
        state.store.create_build(&req).await.unwrap();

        let app = build_router(state);
        let res = app.clone().oneshot(get_req("/api/v1/builds?commit_hash=c1")).await.unwrap();
        let v = body_json(res).await;
        assert_eq!(v["count"], 1);
        assert_eq!(v["builds"][0]["commit_hash"], "c1");

        let res = app.oneshot(get_req("/api/v1/builds?commit_hash=absent")).await.unwrap();
        assert_eq!(body_json(res).await["count"], 0);
    }

    #[tokio::test]
    async fn delete_builds_reports_deleted_keys() {
        let state = test_state();
        let req = BuildRequest { app_name: "demo".into(), commit_hash: "c1".into(), ..Default::default() };
        state.store.create_build(&req).await.unwrap();

        let app = build_router(state);
        let req = Request::builder()
            .method("DELETE")
            .uri("/api/v1/builds/demo")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["count"], 1);
        assert_eq!(v["deleted"], json!(["nina-build-c1"]));
    }

    #[tokio::test]
    async fn deploy_rejects_missing_build() {
        let app = build_router(test_state());
        let body = json!({"app_name": "demo", "commit_hash": "xyz789"});
        let res = app.oneshot(post("/api/v1/deploy", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "no build found for the given commit hash");
    }

    #[tokio::test]
    async fn deploy_rejects_unbuilt_build() {
        let state = test_state();
        let req = BuildRequest { app_name: "demo".into(), commit_hash: "abc123".into(), ..Default::default() };
        state.store.create_build(&req).await.unwrap();

        let app = build_router(state);
        let body = json!({"app_name": "demo", "commit_hash": "abc123"});
        let res = app.oneshot(post("/api/v1/deploy", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let v = body_json(res).await;
        assert_eq!(v["error"], "build is not ready for deployment (status: pending)");
    }

    #[tokio::test]
    async fn deploy_rejects_zero_replicas() {
        let state = test_state();
        seed_built_build(&state, "demo", "abc123").await;
        let app = build_router(state);
        let body = json!({"app_name": "demo", "commit_hash": "abc123", "replicas": 0});
        let res = app.oneshot(post("/api/v1/deploy", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "replicas must be at least 1");
    }

    async fn seed_built_build(state: &AppState, app: &str, commit: &str) {
        let req = BuildRequest { app_name: app.into(), commit_hash: commit.into(), ..Default::default() };
        state.store.create_build(&req).await.unwrap();
        state
            .store
            .update_build_image(
                commit,
                BuildStatus::Built,
                &format!("nina-{app}-{commit}"),
                "sha256:test",
                1,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deploy_returns_deploying_record_for_built_build() {
        let state = test_state();
        seed_built_build(&state, "demo", "abc123").await;

        let app = build_router(state.clone());
        let body = json!({"app_name": "demo", "commit_hash": "abc123", "replicas": 3});
        let res = app.oneshot(post("/api/v1/deploy", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let deployment: Deployment = serde_json::from_value(body_json(res).await).unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Deploying);
        assert!(deployment.containers.is_empty());
        assert!(!deployment.id.is_empty());

        let stored = state.store.get_deployment("demo").await.unwrap();
        assert_eq!(stored.id, deployment.id);
    }

    #[tokio::test]
    async fn get_deployment_not_found() {
        let app = build_router(test_state());
        let res = app.oneshot(get_req("/api/v1/deployments/missing")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "deployment not found");
    }

    #[tokio::test]
    async fn deployment_status_route_matches_get() {
        let state = test_state();
        seed_deployment(&state, "demo").await;
        let app = build_router(state);
        let res = app.oneshot(get_req("/api/v1/deployments/demo/status")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["app_name"], "demo");
    }

    async fn seed_deployment(state: &AppState, app: &str) {
        let req = nina_core::types::DeploymentRequest {
            app_name: app.into(),
            commit_hash: "abc123".into(),
            ..Default::default()
        };
        state.store.create_deployment(&req, "").await.unwrap();
    }

    #[tokio::test]
    async fn list_deployments_filters_by_app_name() {
        let state = test_state();
        seed_deployment(&state, "demo").await;
        seed_deployment(&state, "other").await;

        let app = build_router(state);
        let res = app.clone().oneshot(get_req("/api/v1/deployments")).await.unwrap();
        assert_eq!(body_json(res).await["count"], 2);

        let res = app.oneshot(get_req("/api/v1/deployments?app_name=demo")).await.unwrap();
        let v = body_json(res).await;
        assert_eq!(v["count"], 1);
        assert_eq!(v["deployments"][0]["app_name"], "demo");
    }

    #[tokio::test]
    async fn delete_deployment_then_404_on_second_delete() {
        let state = test_state();
        seed_deployment(&state, "demo").await;

        let app = build_router(state);
        let del = |uri: &str| {
            Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
        };
        let res = app.clone().oneshot(del("/api/v1/deployments/demo")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["id"], "demo");
        assert_eq!(v["containers_removed"], 0);

        let res = app.oneshot(del("/api/v1/deployments/demo")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

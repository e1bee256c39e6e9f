//! Typed access to the platform's key-value namespace. One JSON value per
//! key: builds live under `nina-build-<commit_hash>`, deployments under
//! `nina-deployment-<app_name>`. The store owns the key patterns and
//! nothing else; all writes are last-writer-wins and the engine serializes
//! them per commit hash / app name.

mod backend;

pub use backend::{KvBackend, MemoryBackend, RedisBackend};

use crate::types::{
    Build, BuildRequest, BuildStatus, Container, Deployment, DeploymentRequest, DeploymentStatus,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const BUILD_KEY_PREFIX: &str = "nina-build-";
pub const DEPLOYMENT_KEY_PREFIX: &str = "nina-deployment-";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn backend(e: impl std::fmt::Display) -> Self {
        StoreError::Backend(e.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub fn build_key(commit_hash: &str) -> String {
    format!("{BUILD_KEY_PREFIX}{commit_hash}")
}

pub fn deployment_key(app_name: &str) -> String {
    format!("{DEPLOYMENT_KEY_PREFIX}{app_name}")
}

/// Cheap-to-clone handle over a key-value backend. Handlers receive one at
/// construction; tests hand in a [`MemoryBackend`].
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KvBackend>,
}

impl Store {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let raw = self
            .backend
            .get(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        serde_json::from_slice(&raw).map_err(StoreError::backend)
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(value).map_err(StoreError::backend)?;
        self.backend.put(key, raw).await
    }

    /// Fetch and decode every record under `prefix`. Records that fail to
    /// decode (or vanish between KEYS and GET) are logged and skipped.
    async fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let keys = self.backend.keys(prefix).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let raw = match self.backend.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to fetch record");
                    continue;
                }
            };
            match serde_json::from_slice(&raw) {
                Ok(v) => out.push(v),
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable record"),
            }
        }
        Ok(out)
    }

    // ----- builds -------------------------------------------------------

    /// Create the pending build record for a request.
    pub async fn create_build(&self, req: &BuildRequest) -> Result<Build, StoreError> {
        let build = Build {
            app_name: req.app_name.clone(),
            repo_url: req.repo_url.clone(),
            author: req.author.clone(),
            author_email: req.author_email.clone(),
            commit_hash: req.commit_hash.clone(),
            commit_message: req.commit_message.clone(),
            image_tag: String::new(),
            image_id: String::new(),
            size: 0,
            status: BuildStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.put_build(&build).await?;
        info!(commit_hash = %build.commit_hash, app_name = %build.app_name, "created build");
        Ok(build)
    }

    pub async fn put_build(&self, build: &Build) -> Result<(), StoreError> {
        self.put_json(&build_key(&build.commit_hash), build).await
    }

    pub async fn get_build(&self, commit_hash: &str) -> Result<Build, StoreError> {
        self.get_json(&build_key(commit_hash)).await
    }

    pub async fn update_build_status(
        &self,
        commit_hash: &str,
        status: BuildStatus,
    ) -> Result<(), StoreError> {
        let mut build = self.get_build(commit_hash).await?;
        build.status = status;
        if status.is_terminal() {
            build.finished_at = Some(Utc::now());
        }
        self.put_build(&build).await?;
        info!(commit_hash = %commit_hash, status = %status, "updated build status");
        Ok(())
    }

    /// Record the image artifact alongside a (usually terminal) status.
    pub async fn update_build_image(
        &self,
        commit_hash: &str,
        status: BuildStatus,
        image_tag: &str,
        image_id: &str,
        size: i64,
    ) -> Result<(), StoreError> {
        let mut build = self.get_build(commit_hash).await?;
        build.status = status;
        build.image_tag = image_tag.to_string();
        build.image_id = image_id.to_string();
        build.size = size;
        if status.is_terminal() {
            build.finished_at = Some(Utc::now());
        }
        self.put_build(&build).await?;
        info!(commit_hash = %commit_hash, status = %status, image_tag = %image_tag, "updated build image");
        Ok(())
    }

    pub async fn list_builds(&self) -> Result<Vec<Build>, StoreError> {
        self.list_json(BUILD_KEY_PREFIX).await
    }

    /// Zero-or-one build for a commit; an absent key is an empty list.
    pub async fn list_builds_by_commit(&self, commit_hash: &str) -> Result<Vec<Build>, StoreError> {
        match self.get_build(commit_hash).await {
            Ok(b) => Ok(vec![b]),
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Delete every build whose `app_name` or `commit_hash` equals `id`.
    /// Returns the keys that were deleted; per-key failures are skipped.
    pub async fn delete_builds_matching(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let builds = self.list_builds().await?;
        let mut deleted = Vec::new();
        for build in builds {
            if build.app_name != id && build.commit_hash != id {
                continue;
            }
            let key = build_key(&build.commit_hash);
            match self.backend.delete(&key).await {
                Ok(true) => deleted.push(key),
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "failed to delete build"),
            }
        }
        Ok(deleted)
    }

    // ----- deployments --------------------------------------------------

    /// Create the deployment record for a request with status `deploying`
    /// and no containers yet.
    pub async fn create_deployment(
        &self,
        req: &DeploymentRequest,
        repo_url: &str,
    ) -> Result<Deployment, StoreError> {
        let now = Utc::now();
        let deployment = Deployment {
            id: Uuid::new_v4().to_string(),
            app_name: req.app_name.clone(),
            commit_hash: req.commit_hash.clone(),
            repo_url: repo_url.to_string(),
            author: req.author.clone(),
            author_email: req.author_email.clone(),
            commit_message: req.commit_message.clone(),
            status: DeploymentStatus::Deploying,
            containers: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.put_deployment(&deployment).await?;
        info!(id = %deployment.id, app_name = %deployment.app_name, "created deployment");
        Ok(deployment)
    }

    pub async fn put_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        self.put_json(&deployment_key(&deployment.app_name), deployment).await
    }

    pub async fn get_deployment(&self, app_name: &str) -> Result<Deployment, StoreError> {
        self.get_json(&deployment_key(app_name)).await
    }

    pub async fn update_deployment_status(
        &self,
        app_name: &str,
        status: DeploymentStatus,
    ) -> Result<(), StoreError> {
        let mut deployment = self.get_deployment(app_name).await?;
        deployment.status = status;
        deployment.updated_at = Utc::now();
        self.put_deployment(&deployment).await?;
        info!(app_name = %app_name, status = %status, "updated deployment status");
        Ok(())
    }

    pub async fn update_deployment_containers(
        &self,
        app_name: &str,
        containers: Vec<Container>,
        status: DeploymentStatus,
    ) -> Result<(), StoreError> {
        let mut deployment = self.get_deployment(app_name).await?;
        deployment.containers = containers;
        deployment.status = status;
        deployment.updated_at = Utc::now();
        self.put_deployment(&deployment).await?;
        info!(
            app_name = %app_name,
            containers = deployment.containers.len(),
            status = %status,
            "updated deployment containers"
        );
        Ok(())
    }

    pub async fn list_deployments(&self) -> Result<Vec<Deployment>, StoreError> {
        self.list_json(DEPLOYMENT_KEY_PREFIX).await
    }

    /// Zero-or-one deployment for an app; an absent key is an empty list.
    pub async fn list_deployments_by_app(
        &self,
        app_name: &str,
    ) -> Result<Vec<Deployment>, StoreError> {
        match self.get_deployment(app_name).await {
            Ok(d) => Ok(vec![d]),
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Idempotent: deleting an absent deployment succeeds.
    pub async fn delete_deployment(&self, app_name: &str) -> Result<(), StoreError> {
        self.backend.delete(&deployment_key(app_name)).await?;
        info!(app_name = %app_name, "deleted deployment");
        Ok(())
    }
}

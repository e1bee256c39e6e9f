//! The build pipeline: bundle extraction, buildpack detection, image
//! construction and the persistent status transitions that accompany them.
//!
//! A build for a commit hash moves forward only:
//!
//! ```text
//! pending -> building -> built
//!    \----------\--------> failed
//! ```

mod bundle;
mod buildpack;
mod golang;

pub use bundle::{Bundle, MAX_ENTRY_BYTES};
pub use buildpack::Buildpack;
pub use golang::GolangBuildpack;

use crate::AppState;
use nina_core::store::StoreError;
use nina_core::types::{BuildRequest, BuildStatus, DeploymentImage};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Total wall-clock budget for one build, extraction included.
pub const BUILD_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to decode bundle: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("entry escapes the extraction root: {0}")]
    PathTraversal(String),
    #[error("no buildpack matched this project type")]
    NoBuildpack,
    #[error("{0}")]
    Detect(String),
    #[error("image build failed: {0}")]
    ImageBuild(String),
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Ordered buildpack registry. The first buildpack whose `matches` returns
/// true wins.
pub struct Builder {
    buildpacks: Vec<Box<dyn Buildpack>>,
}

impl Builder {
    pub fn new() -> Self {
        Self { buildpacks: vec![Box::new(GolangBuildpack)] }
    }

    pub fn detect(&self, bundle: &Bundle) -> Result<&dyn Buildpack, BuildError> {
        for buildpack in &self.buildpacks {
            match buildpack.matches(bundle) {
                Ok(true) => {
                    info!(buildpack = buildpack.name(), "buildpack matched");
                    return Ok(buildpack.as_ref());
                }
                Ok(false) => {}
                Err(e) => {
                    error!(buildpack = buildpack.name(), error = %e, "buildpack match failed");
                }
            }
        }
        Err(BuildError::NoBuildpack)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one accepted build to a terminal state. Runs detached from the
/// intake request with its own deadline; every failure path records
/// `failed` in the store.
pub async fn run(state: AppState, req: BuildRequest) {
    let commit_hash = req.commit_hash.clone();
    match tokio::time::timeout(BUILD_DEADLINE, execute(&state, &req)).await {
        Ok(Ok(image)) => {
            info!(
                commit_hash = %commit_hash,
                image_tag = %image.image_tag,
                size = image.size,
                "build completed"
            );
        }
        Ok(Err(e)) => {
            error!(commit_hash = %commit_hash, error = %e, "build failed");
            mark_failed(&state, &commit_hash).await;
        }
        Err(_) => {
            error!(commit_hash = %commit_hash, deadline = ?BUILD_DEADLINE, "build deadline exceeded");
            mark_failed(&state, &commit_hash).await;
        }
    }
}

async fn execute(state: &AppState, req: &BuildRequest) -> Result<DeploymentImage, BuildError> {
    let content = req.bundle_content.clone();
    let bundle = tokio::task::spawn_blocking(move || Bundle::extract(&content))
        .await
        .map_err(|e| BuildError::Detect(format!("extraction task failed: {e}")))??;

    let buildpack = state.builder.detect(&bundle)?;
    state.store.update_build_status(&req.commit_hash, BuildStatus::Building).await?;

    let image = buildpack.build(&state.docker, req, &bundle).await?;
    state
        .store
        .update_build_image(
            &req.commit_hash,
            BuildStatus::Built,
            &image.image_tag,
            &image.image_id,
            image.size,
        )
        .await?;

    if let Err(e) = bundle.cleanup() {
        error!(commit_hash = %req.commit_hash, error = %e, "failed to release scratch dir");
    }
    Ok(image)
}

async fn mark_failed(state: &AppState, commit_hash: &str) {
    if let Err(e) = state.store.update_build_status(commit_hash, BuildStatus::Failed).await {
        error!(commit_hash = %commit_hash, error = %e, "failed to record failed build status");
    }
}

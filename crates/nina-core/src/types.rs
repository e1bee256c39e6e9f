//! Record types shared across the platform. All of them serialize to JSON
//! with snake_case field names; the store persists them verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a build. Advances forward only; `Failed` is terminal from
/// any earlier state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Building,
    Built,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Built | BuildStatus::Failed)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Building => "building",
            BuildStatus::Built => "built",
            BuildStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Unavailable,
    Deploying,
    Ready,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Unavailable => "unavailable",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Ready => "ready",
            DeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One build per commit hash, associating the source commit with the
/// container image produced from it. `image_tag`/`image_id`/`size` stay
/// empty until the build reaches `built`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Build {
    pub app_name: String,
    pub repo_url: String,
    pub author: String,
    pub author_email: String,
    pub commit_hash: String,
    pub commit_message: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub size: i64,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One deployment per application: the current generation of container
/// replicas running a built image.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Deployment {
    pub id: String,
    pub app_name: String,
    pub commit_hash: String,
    #[serde(default)]
    pub repo_url: String,
    pub author: String,
    pub author_email: String,
    pub commit_message: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub containers: Vec<Container>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single container replica backing a deployment, addressable at
/// `address:port` on the host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub container_id: String,
    pub image_tag: String,
    pub address: String,
    pub port: u16,
}

/// Wire request for `POST /api/v1/build`. `bundle_content` carries
/// base64(gzip(tar)) of the working copy, `.git` excluded.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BuildRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub bundle_content: String,
}

/// Wire request for `POST /api/v1/deploy`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeploymentRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
}

fn default_replicas() -> i64 {
    1
}

impl Default for DeploymentRequest {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            commit_hash: String::new(),
            author: String::new(),
            author_email: String::new(),
            commit_message: String::new(),
            replicas: default_replicas(),
        }
    }
}

/// Output of a buildpack: the image produced for a build.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeploymentImage {
    pub image_tag: String,
    pub image_id: String,
    pub size: i64,
}

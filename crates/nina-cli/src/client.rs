//! Typed client for the Engine HTTP API.

use anyhow::{bail, Context, Result};
use nina_core::config::Config;
use nina_core::types::{Build, BuildRequest, BuildStatus, Deployment, DeploymentRequest};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct BuildsEnvelope {
    builds: Vec<Build>,
}

#[derive(Deserialize)]
struct DeploymentsEnvelope {
    deployments: Vec<Deployment>,
}

#[derive(Deserialize)]
pub struct DeletedBuilds {
    pub deleted: Vec<String>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct DeletedDeployment {
    pub id: String,
    pub containers_removed: usize,
}

pub struct ApiClient {
    base: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build http client")?;
        Ok(Self { base: format!("http://{}", cfg.server_addr()), client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn read_error(resp: reqwest::Response) -> anyhow::Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::anyhow!("{} (status: {})", body.trim(), status.as_u16())
    }

    pub async fn health(&self) -> Result<()> {
        let resp = self.client.get(self.url("/health")).send().await.context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("health check failed: {}", Self::read_error(resp).await);
        }
        Ok(())
    }

    /// Submit a build; the engine replies with the pending record.
    pub async fn submit_build(&self, req: &BuildRequest) -> Result<Build> {
        let resp = self
            .client
            .post(self.url("/api/v1/build"))
            .json(req)
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::CREATED {
            bail!("build failed: {}", Self::read_error(resp).await);
        }
        resp.json().await.context("decode build record")
    }

    /// Poll until the build reaches a terminal state. Errors if the build
    /// fails, vanishes, or takes longer than the engine's own deadline.
    pub async fn wait_for_build(&self, commit_hash: &str) -> Result<Build> {
        const POLL_INTERVAL: Duration = Duration::from_secs(2);
        const WAIT_BUDGET: Duration = Duration::from_secs(300);

        let start = std::time::Instant::now();
        loop {
            let builds = self.builds_by_commit(commit_hash).await?;
            match builds.into_iter().next() {
                Some(build) => match build.status {
                    BuildStatus::Built => return Ok(build),
                    BuildStatus::Failed => bail!("build for commit {commit_hash} failed"),
                    _ => debug!(commit_hash, status = %build.status, "build in progress"),
                },
                None => bail!("build record for commit {commit_hash} disappeared"),
            }
            if start.elapsed() > WAIT_BUDGET {
                bail!("timed out waiting for build of commit {commit_hash}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn list_builds(&self) -> Result<Vec<Build>> {
        let resp = self
            .client
            .get(self.url("/api/v1/builds"))
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("list builds failed: {}", Self::read_error(resp).await);
        }
        let envelope: BuildsEnvelope = resp.json().await.context("decode builds")?;
        Ok(envelope.builds)
    }

    pub async fn builds_by_commit(&self, commit_hash: &str) -> Result<Vec<Build>> {
        let resp = self
            .client
            .get(self.url("/api/v1/builds"))
            .query(&[("commit_hash", commit_hash)])
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("list builds failed: {}", Self::read_error(resp).await);
        }
        let envelope: BuildsEnvelope = resp.json().await.context("decode builds")?;
        Ok(envelope.builds)
    }

    pub async fn build_exists(&self, commit_hash: &str) -> Result<bool> {
        Ok(!self.builds_by_commit(commit_hash).await?.is_empty())
    }

    pub async fn delete_builds(&self, id: &str) -> Result<DeletedBuilds> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/v1/builds/{id}")))
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("delete failed: {}", Self::read_error(resp).await);
        }
        resp.json().await.context("decode delete response")
    }

    pub async fn submit_deploy(&self, req: &DeploymentRequest) -> Result<Deployment> {
        let resp = self
            .client
            .post(self.url("/api/v1/deploy"))
            .json(req)
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::CREATED {
            bail!("deploy failed: {}", Self::read_error(resp).await);
        }
        resp.json().await.context("decode deployment record")
    }

    pub async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let resp = self
            .client
            .get(self.url("/api/v1/deployments"))
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("list deployments failed: {}", Self::read_error(resp).await);
        }
        let envelope: DeploymentsEnvelope = resp.json().await.context("decode deployments")?;
        Ok(envelope.deployments)
    }

    pub async fn deployments_by_app(&self, app_name: &str) -> Result<Vec<Deployment>> {
        let resp = self
            .client
            .get(self.url("/api/v1/deployments"))
            .query(&[("app_name", app_name)])
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("list deployments failed: {}", Self::read_error(resp).await);
        }
        let envelope: DeploymentsEnvelope = resp.json().await.context("decode deployments")?;
        Ok(envelope.deployments)
    }

    pub async fn deployment_exists(&self, app_name: &str) -> Result<bool> {
        Ok(!self.deployments_by_app(app_name).await?.is_empty())
    }

    pub async fn deployment_status(&self, id: &str) -> Result<Deployment> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/deployments/{id}/status")))
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("get status failed: {}", Self::read_error(resp).await);
        }
        resp.json().await.context("decode deployment record")
    }

    pub async fn delete_deployment(&self, id: &str) -> Result<DeletedDeployment> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/v1/deployments/{id}")))
            .send()
            .await
            .context("send request")?;
        if resp.status() != StatusCode::OK {
            bail!("delete failed: {}", Self::read_error(resp).await);
        }
        resp.json().await.context("decode delete response")
    }
}

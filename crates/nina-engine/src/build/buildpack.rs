use super::{Bundle, BuildError};
use async_trait::async_trait;
use bollard::Docker;
use nina_core::types::{BuildRequest, DeploymentImage};

/// A buildpack recognizes a project type and turns an extracted bundle
/// into a runnable container image. Adding a language means implementing
/// this trait and registering the instance with [`super::Builder`]; the
/// builder picks the first buildpack whose `matches` returns true.
#[async_trait]
pub trait Buildpack: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure read over the extracted tree; must not modify the bundle.
    fn matches(&self, bundle: &Bundle) -> Result<bool, BuildError>;

    /// Produce the image for this bundle, tagged `nina-<app>-<commit>`.
    async fn build(
        &self,
        docker: &Docker,
        req: &BuildRequest,
        bundle: &Bundle,
    ) -> Result<DeploymentImage, BuildError>;
}

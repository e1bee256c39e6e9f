//! Reference buildpack: Go modules projects with a `main` package at the
//! top of the tree (or in the first subdirectory, for bundles that wrap
//! the project in a single folder).

use super::{Bundle, BuildError, Buildpack};
use async_trait::async_trait;
use bollard::image::BuildImageOptions;
use bollard::models::BuildInfoAux;
use bollard::Docker;
use futures_util::StreamExt;
use nina_core::types::{BuildRequest, DeploymentImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const DOCKERFILE: &str = "\
# Build stage
FROM golang:1.24-alpine AS builder
WORKDIR /app
COPY . .
RUN go build -o myapp

# Run stage
FROM scratch
ARG PORT=8080
EXPOSE ${PORT}
COPY --from=builder /app/myapp /myapp
ENTRYPOINT [\"/myapp\"]
";

pub struct GolangBuildpack;

impl GolangBuildpack {
    /// The directory holding the Go module: the scratch root when it
    /// carries `go.mod`, otherwise the first subdirectory alphabetically.
    fn base_dir(&self, bundle: &Bundle) -> Result<PathBuf, BuildError> {
        let root = bundle.path();
        if root.join("go.mod").is_file() {
            return Ok(root.to_path_buf());
        }
        let mut subdirs: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort();
        subdirs
            .into_iter()
            .next()
            .ok_or_else(|| BuildError::Detect("no go.mod and no subdirectory in bundle".into()))
    }
}

#[async_trait]
impl Buildpack for GolangBuildpack {
    fn name(&self) -> &'static str {
        "golang"
    }

    fn matches(&self, bundle: &Bundle) -> Result<bool, BuildError> {
        let base = match self.base_dir(bundle) {
            Ok(b) => b,
            Err(_) => return Ok(false),
        };
        for required in ["go.mod", "go.sum", "main.go"] {
            if !base.join(required).is_file() {
                debug!(base = %base.display(), missing = required, "go project check failed");
                return Ok(false);
            }
        }
        let source = fs::read_to_string(base.join("main.go"))?;
        match package_clause(&source) {
            Some(name) if name == "main" => Ok(true),
            Some(name) => {
                debug!(package = %name, "main.go does not declare package main");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn build(
        &self,
        docker: &Docker,
        req: &BuildRequest,
        bundle: &Bundle,
    ) -> Result<DeploymentImage, BuildError> {
        let base = self.base_dir(bundle)?;
        fs::write(base.join("Dockerfile"), DOCKERFILE)?;
        debug!(base = %base.display(), "dockerfile written");

        let context = build_context_tar(&base)?;
        let image_tag = format!("nina-{}-{}", req.app_name, req.commit_hash);
        let options = BuildImageOptions::<String> {
            t: image_tag.clone(),
            dockerfile: "Dockerfile".into(),
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        let mut stream = docker.build_image(options, None, Some(context.into()));
        let mut image_id = String::new();
        while let Some(msg) = stream.next().await {
            let update = msg?;
            if let Some(line) = update.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(output = %line, "image build");
                }
            }
            if let Some(detail) = update.error {
                error!(error = %detail, image_tag = %image_tag, "image build failed");
                return Err(BuildError::ImageBuild(detail));
            }
            if let Some(BuildInfoAux::Default(id)) = update.aux {
                if let Some(id) = id.id {
                    image_id = id;
                }
            }
        }
        if image_id.is_empty() {
            return Err(BuildError::ImageBuild("no image id in build output".into()));
        }

        let inspect = docker.inspect_image(&image_id).await?;
        let size = inspect.size.unwrap_or(0);
        info!(image_tag = %image_tag, image_id = %image_id, size, "image built");
        Ok(DeploymentImage { image_tag, image_id, size })
    }
}

/// Extract the package name from a Go source file: the first
/// non-comment, non-blank line must be a `package` clause.
fn package_clause(source: &str) -> Option<String> {
    let mut in_block_comment = false;
    for raw in source.lines() {
        let mut line = raw.trim().to_string();
        if in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    in_block_comment = false;
                    line = line[end + 2..].trim().to_string();
                }
                None => continue,
            }
        }
        while let Some(start) = line.find("/*") {
            match line[start + 2..].find("*/") {
                Some(end) => {
                    let tail = line[start + 2 + end + 2..].to_string();
                    line = format!("{}{}", line[..start].trim_end(), tail).trim().to_string();
                }
                None => {
                    in_block_comment = true;
                    line = line[..start].trim().to_string();
                    break;
                }
            }
        }
        if let Some(idx) = line.find("//") {
            line = line[..idx].trim().to_string();
        }
        if line.is_empty() {
            continue;
        }
        let rest = line.strip_prefix("package")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        return Some(rest.split_whitespace().next().unwrap_or("").to_string());
    }
    None
}

/// Tar the build context; docker accepts an uncompressed archive.
fn build_context_tar(dir: &Path) -> Result<Vec<u8>, BuildError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", dir)?;
    Ok(builder.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn bundle_of(files: &[(&str, &str)]) -> Bundle {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, *name, data.as_bytes()).unwrap();
        }
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&builder.into_inner().unwrap()).unwrap();
        Bundle::extract(&BASE64.encode(gz.finish().unwrap())).unwrap()
    }

    const MAIN_GO: &str = "package main\n\nfunc main() {}\n";

    #[test]
    fn matches_project_at_bundle_root() {
        let bundle = bundle_of(&[("go.mod", "module demo\n"), ("go.sum", ""), ("main.go", MAIN_GO)]);
        assert!(GolangBuildpack.matches(&bundle).unwrap());
    }

    #[test]
    fn matches_project_in_subdirectory() {
        let bundle = bundle_of(&[
            ("demo/go.mod", "module demo\n"),
            ("demo/go.sum", ""),
            ("demo/main.go", MAIN_GO),
        ]);
        assert!(GolangBuildpack.matches(&bundle).unwrap());
    }

    #[test]
    fn picks_first_subdirectory_alphabetically() {
        let bundle = bundle_of(&[
            ("zeta/unrelated.txt", ""),
            ("alpha/go.mod", "module demo\n"),
            ("alpha/go.sum", ""),
            ("alpha/main.go", MAIN_GO),
        ]);
        assert!(GolangBuildpack.matches(&bundle).unwrap());
    }

    #[test]
    fn rejects_missing_go_sum() {
        let bundle = bundle_of(&[("go.mod", "module demo\n"), ("main.go", MAIN_GO)]);
        assert!(!GolangBuildpack.matches(&bundle).unwrap());
    }

    #[test]
    fn rejects_non_main_package() {
        let bundle = bundle_of(&[
            ("go.mod", "module demo\n"),
            ("go.sum", ""),
            ("main.go", "package library\n"),
        ]);
        assert!(!GolangBuildpack.matches(&bundle).unwrap());
    }

    #[test]
    fn package_clause_skips_comments() {
        assert_eq!(
            package_clause("// Command demo does things.\npackage main\n").as_deref(),
            Some("main")
        );
        assert_eq!(
            package_clause("/*\nlicense\nheader\n*/\npackage main\n").as_deref(),
            Some("main")
        );
        assert_eq!(package_clause("/* inline */ package main\n").as_deref(), Some("main"));
        assert_eq!(package_clause("package\tlibrary\n").as_deref(), Some("library"));
        assert_eq!(package_clause("packagemain\n"), None);
        assert_eq!(package_clause(""), None);
    }
}

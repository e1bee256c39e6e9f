use super::{format_bytes, print_builds_table};
use crate::bundle::pack_working_copy;
use crate::client::ApiClient;
use crate::git;
use anyhow::{bail, Context, Result};
use nina_core::types::BuildRequest;
use std::path::Path;
use tracing::info;

/// `nina build`: pack the working copy, submit it, and wait for the image.
pub async fn handle(client: &ApiClient) -> Result<()> {
    let cwd = std::env::current_dir().context("get current working directory")?;
    let req = build_request_for(&cwd)?;

    if client.build_exists(&req.commit_hash).await? {
        bail!("a build for commit {} already exists", req.commit_hash);
    }

    info!(app_name = %req.app_name, commit_hash = %req.commit_hash, "submitting build");
    let accepted = client.submit_build(&req).await?;
    println!("Build accepted for {} ({})", accepted.app_name, truncated(&accepted.commit_hash));

    let built = client.wait_for_build(&req.commit_hash).await?;
    println!("✅ Build completed successfully!");
    println!("📦 Image Tag: {}", built.image_tag);
    println!("🆔 Image ID: {}", built.image_id);
    println!("📏 Size: {}", format_bytes(built.size));
    println!("\nThe container image has been successfully built and stored.");
    Ok(())
}

fn truncated(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

fn build_request_for(dir: &Path) -> Result<BuildRequest> {
    if !git::is_git_repository(dir) {
        bail!("directory is not a Git repository: {}", dir.display());
    }
    let repo_url = git::repo_url(dir)?;
    let app_name = git::app_name_from_repo_url(&repo_url)?;
    let commit = git::last_commit(dir)?;
    let bundle_content = pack_working_copy(dir)?;
    Ok(BuildRequest {
        app_name,
        repo_url,
        author: commit.author,
        author_email: commit.email,
        commit_hash: commit.hash,
        commit_message: commit.message,
        bundle_content,
    })
}

/// `nina build ls`
pub async fn handle_ls(client: &ApiClient) -> Result<()> {
    let builds = client.list_builds().await?;
    print_builds_table(&builds);
    Ok(())
}

/// `nina build rm <id>`
pub async fn handle_rm(client: &ApiClient, id: &str) -> Result<()> {
    let deleted = client.delete_builds(id).await?;
    if deleted.count == 0 {
        println!("No builds matched '{id}'.");
        return Ok(());
    }
    println!("Deleted {} build(s):", deleted.count);
    for key in &deleted.deleted {
        println!("- {key}");
    }
    Ok(())
}

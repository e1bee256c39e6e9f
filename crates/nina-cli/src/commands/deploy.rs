use super::print_deployments_table;
use crate::client::ApiClient;
use crate::git;
use anyhow::{bail, Context, Result};
use nina_core::types::DeploymentRequest;
use std::time::Instant;
use tracing::info;

/// `nina deploy [--replicas N]`
pub async fn handle(client: &ApiClient, replicas: i64) -> Result<()> {
    let cwd = std::env::current_dir().context("get current working directory")?;
    if !git::is_git_repository(&cwd) {
        bail!("directory is not a Git repository: {}", cwd.display());
    }
    let repo_url = git::repo_url(&cwd)?;
    let app_name = git::app_name_from_repo_url(&repo_url)?;
    let commit = git::last_commit(&cwd)?;

    if client.deployment_exists(&app_name).await? {
        bail!("a deployment for app {app_name} already exists");
    }

    let req = DeploymentRequest {
        app_name: app_name.clone(),
        commit_hash: commit.hash,
        author: commit.author,
        author_email: commit.email,
        commit_message: commit.message,
        replicas,
    };

    info!(app_name = %app_name, replicas, "submitting deployment");
    let start = Instant::now();
    let deployment = client.submit_deploy(&req).await?;
    let elapsed = start.elapsed();

    println!("✅ Deployment completed successfully!");
    println!("🆔 Deployment ID: {}", deployment.id);
    println!("📱 App Name: {}", deployment.app_name);
    println!("🔗 Commit Hash: {}", deployment.commit_hash);
    println!("👤 Author: {}", deployment.author);
    println!("📝 Commit Message: {}", deployment.commit_message);
    println!("📊 Status: {}", deployment.status);
    println!("⏱️  Elapsed Time: {elapsed:.2?}");
    if !deployment.containers.is_empty() {
        println!("🐳 Containers:");
        for (i, c) in deployment.containers.iter().enumerate() {
            println!(
                "  {}. ID: {}, Image: {}, Address: {}:{}",
                i + 1,
                c.container_id,
                c.image_tag,
                c.address,
                c.port
            );
        }
    }
    println!("\nThe application has been successfully deployed.");
    Ok(())
}

/// `nina deploy ls`
pub async fn handle_ls(client: &ApiClient) -> Result<()> {
    let deployments = client.list_deployments().await?;
    print_deployments_table(&deployments, true);
    Ok(())
}

/// `nina deploy rm <id>`
pub async fn handle_rm(client: &ApiClient, id: &str) -> Result<()> {
    let deleted = client.delete_deployment(id).await?;
    println!(
        "Deployment {} deleted successfully ({} container(s) removed)",
        deleted.id, deleted.containers_removed
    );
    Ok(())
}

//! Legacy command variants kept for muscle memory: `status`, `list` and
//! `delete` mirror `deploy ls` / `deploy rm` with slightly different
//! output shapes.

use super::print_deployments_table;
use crate::client::ApiClient;
use anyhow::{Context, Result};

/// `nina status <id>`: pretty-printed deployment record.
pub async fn handle_status(client: &ApiClient, id: &str) -> Result<()> {
    let deployment = client.deployment_status(id).await?;
    let pretty = serde_json::to_string_pretty(&deployment).context("render deployment")?;
    println!("{pretty}");
    Ok(())
}

/// `nina list`
pub async fn handle_list(client: &ApiClient) -> Result<()> {
    let deployments = client.list_deployments().await?;
    print_deployments_table(&deployments, false);
    Ok(())
}

/// `nina delete <id>`
pub async fn handle_delete(client: &ApiClient, id: &str) -> Result<()> {
    client.delete_deployment(id).await?;
    println!("Deployment {id} deleted successfully");
    Ok(())
}

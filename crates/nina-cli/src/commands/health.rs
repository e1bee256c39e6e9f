use crate::client::ApiClient;
use anyhow::Result;

/// `nina health`
pub async fn handle(client: &ApiClient) -> Result<()> {
    client.health().await?;
    println!("✅ Engine server is healthy");
    Ok(())
}

//! Replica manager: creates N containers for a deployment, collects the
//! host ports the runtime assigned, and reconciles the deployment record
//! with whatever actually started.

use crate::AppState;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use nina_core::types::{Container, DeploymentStatus};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Declared container port; the runtime picks the host side.
const CONTAINER_PORT: u16 = 8080;

/// Total wall-clock budget for provisioning all replicas.
pub const DEPLOY_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
    #[error("no host port assigned for container {0}")]
    MissingHostPort(String),
}

/// Drive one accepted deployment to a terminal state. Containers that
/// started before a failure stay recorded on the deployment and are not
/// rolled back; delete cleans them up.
pub async fn run(state: AppState, app_name: String, image_tag: String, replicas: i64) {
    info!(app_name = %app_name, image_tag = %image_tag, replicas, "starting container deployment");
    match tokio::time::timeout(DEPLOY_DEADLINE, provision(&state.docker, &app_name, &image_tag, replicas)).await {
        Ok((containers, None)) => {
            let count = containers.len();
            if let Err(e) = state
                .store
                .update_deployment_containers(&app_name, containers, DeploymentStatus::Ready)
                .await
            {
                error!(app_name = %app_name, error = %e, "failed to record ready deployment");
                return;
            }
            info!(app_name = %app_name, replicas = count, "deployment completed");
        }
        Ok((containers, Some(e))) => {
            error!(app_name = %app_name, started = containers.len(), error = %e, "deployment failed");
            if let Err(e) = state
                .store
                .update_deployment_containers(&app_name, containers, DeploymentStatus::Failed)
                .await
            {
                error!(app_name = %app_name, error = %e, "failed to record failed deployment");
            }
        }
        Err(_) => {
            error!(app_name = %app_name, deadline = ?DEPLOY_DEADLINE, "deployment deadline exceeded");
            if let Err(e) =
                state.store.update_deployment_status(&app_name, DeploymentStatus::Failed).await
            {
                error!(app_name = %app_name, error = %e, "failed to record failed deployment");
            }
        }
    }
}

/// Create and start `replicas` containers, stopping at the first failure.
/// Returns every container that made it, plus the error if one occurred.
async fn provision(
    docker: &Docker,
    app_name: &str,
    image_tag: &str,
    replicas: i64,
) -> (Vec<Container>, Option<DeployError>) {
    let mut containers = Vec::with_capacity(replicas.max(0) as usize);
    for replica in 1..=replicas {
        match create_and_start(docker, app_name, image_tag, replica).await {
            Ok(container) => {
                info!(
                    app_name = %app_name,
                    replica,
                    container_id = %container.container_id,
                    port = container.port,
                    "replica started"
                );
                containers.push(container);
            }
            Err(e) => return (containers, Some(e)),
        }
    }
    (containers, None)
}

async fn create_and_start(
    docker: &Docker,
    app_name: &str,
    image_tag: &str,
    replica: i64,
) -> Result<Container, DeployError> {
    let port_key = format!("{CONTAINER_PORT}/tcp");

    let mut exposed = HashMap::new();
    exposed.insert(port_key.clone(), HashMap::new());
    let mut bindings = HashMap::new();
    bindings.insert(
        port_key.clone(),
        // Empty host port asks the runtime for a free one.
        Some(vec![PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some(String::new()),
        }]),
    );

    let config = Config {
        image: Some(image_tag.to_string()),
        env: Some(vec![format!("PORT={CONTAINER_PORT}")]),
        exposed_ports: Some(exposed),
        host_config: Some(HostConfig { port_bindings: Some(bindings), ..Default::default() }),
        ..Default::default()
    };

    let name = unique_container_name(app_name, replica);
    let created = docker
        .create_container(Some(CreateContainerOptions { name: name.clone(), platform: None }), config)
        .await?;
    let container_id = created.id;
    info!(container_id = %container_id, name = %name, "container created");

    docker.start_container(&container_id, None::<StartContainerOptions<String>>).await?;

    let inspected = docker.inspect_container(&container_id, None::<InspectContainerOptions>).await?;
    let host_port = inspected
        .network_settings
        .and_then(|ns| ns.ports)
        .and_then(|ports| ports.get(&port_key).cloned().flatten())
        .and_then(|bindings| bindings.into_iter().next())
        .and_then(|binding| binding.host_port)
        .and_then(|port| port.parse::<u16>().ok())
        .ok_or_else(|| DeployError::MissingHostPort(container_id.clone()))?;

    Ok(Container {
        container_id,
        image_tag: image_tag.to_string(),
        address: "localhost".to_string(),
        port: host_port,
    })
}

/// `nina-<app>-<replica>-<random>` with a suffix from the system CSPRNG.
fn unique_container_name(app_name: &str, replica: i64) -> String {
    let mut buf = [0u8; 8];
    let _ = OsRng.try_fill_bytes(&mut buf);
    let suffix = u64::from_le_bytes(buf) % 1_000_000;
    format!("nina-{app_name}-{replica}-{suffix}")
}

/// Force-remove every container of a deployment, best-effort: one failure
/// does not abort the loop. Returns how many were removed.
pub async fn remove_containers(docker: &Docker, containers: &[Container]) -> usize {
    let mut removed = 0;
    for container in containers {
        if container.container_id.is_empty() {
            continue;
        }
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        match docker.remove_container(&container.container_id, Some(options)).await {
            Ok(()) => {
                info!(container_id = %container.container_id, "container removed");
                removed += 1;
            }
            Err(e) => {
                warn!(container_id = %container.container_id, error = %e, "failed to remove container");
            }
        }
    }
    removed
}

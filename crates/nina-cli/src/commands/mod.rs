use clap::{Parser, Subcommand};
use nina_core::types::{Build, Deployment};
use std::path::PathBuf;

pub mod build;
pub mod deploy;
pub mod health;
pub mod legacy;

#[derive(Parser, Debug)]
#[command(name = "nina", version, about = "Nina - container provisioning engine CLI")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Log level: trace|debug|info|warn|error
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// Log format: text|json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,
    /// Enable verbose logging
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project in the current directory
    Build {
        #[command(subcommand)]
        action: Option<BuildAction>,
    },
    /// Deploy the project in the current directory
    Deploy {
        /// Number of container replicas to run
        #[arg(long, default_value_t = 1)]
        replicas: i64,
        #[command(subcommand)]
        action: Option<DeployAction>,
    },
    /// Check Engine server health
    Health {},
    /// Get deployment status by id
    Status { id: String },
    /// List all deployments
    List {},
    /// Delete a deployment by id
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum BuildAction {
    /// List all builds
    Ls {},
    /// Remove builds by app name or commit hash
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
pub enum DeployAction {
    /// List all deployments
    Ls {},
    /// Remove a deployment by id
    Rm { id: String },
}

// ----- table rendering ---------------------------------------------------

const MESSAGE_WIDTH: usize = 37;
const HASH_WIDTH: usize = 12;

pub fn truncate_message(message: &str) -> String {
    if message.chars().count() > MESSAGE_WIDTH {
        let cut: String = message.chars().take(MESSAGE_WIDTH).collect();
        format!("{cut}...")
    } else {
        message.to_string()
    }
}

pub fn truncate_hash(hash: &str) -> String {
    hash.chars().take(HASH_WIDTH).collect()
}

pub fn print_builds_table(builds: &[Build]) {
    if builds.is_empty() {
        println!("No builds found.");
        return;
    }
    println!(
        "{:<20} {:<12} {:<20} {:<40} {:<15}",
        "APP NAME", "COMMIT HASH", "AUTHOR", "COMMIT MESSAGE", "STATUS"
    );
    println!("{}", "-".repeat(110));
    for b in builds {
        println!(
            "{:<20} {:<12} {:<20} {:<40} {:<15}",
            b.app_name,
            truncate_hash(&b.commit_hash),
            b.author,
            truncate_message(&b.commit_message),
            b.status.to_string()
        );
    }
    println!("\nTotal builds: {}", builds.len());
}

pub fn print_deployments_table(deployments: &[Deployment], with_replicas: bool) {
    if deployments.is_empty() {
        println!("No deployments found.");
        return;
    }
    if with_replicas {
        println!(
            "{:<20} {:<12} {:<20} {:<40} {:<15} {:<10}",
            "APP NAME", "COMMIT HASH", "AUTHOR", "COMMIT MESSAGE", "STATUS", "REPLICAS"
        );
        println!("{}", "-".repeat(120));
    } else {
        println!(
            "{:<20} {:<12} {:<20} {:<40} {:<15}",
            "APP NAME", "COMMIT HASH", "AUTHOR", "COMMIT MESSAGE", "STATUS"
        );
        println!("{}", "-".repeat(110));
    }
    for d in deployments {
        if with_replicas {
            println!(
                "{:<20} {:<12} {:<20} {:<40} {:<15} {:<10}",
                d.app_name,
                truncate_hash(&d.commit_hash),
                d.author,
                truncate_message(&d.commit_message),
                d.status.to_string(),
                d.containers.len()
            );
        } else {
            println!(
                "{:<20} {:<12} {:<20} {:<40} {:<15}",
                d.app_name,
                truncate_hash(&d.commit_hash),
                d.author,
                truncate_message(&d.commit_message),
                d.status.to_string()
            );
        }
    }
    println!("\nTotal deployments: {}", deployments.len());
}

pub fn format_bytes(bytes: i64) -> String {
    const UNIT: i64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        n /= UNIT;
        exp += 1;
    }
    let units = ['K', 'M', 'G', 'T', 'P', 'E'];
    format!("{:.1} {}B", bytes as f64 / div as f64, units[exp])
}

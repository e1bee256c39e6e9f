mod bundle;
mod client;
mod commands;
mod git;

use anyhow::Result;
use clap::Parser;
use client::ApiClient;
use commands::{BuildAction, Cli, Commands, DeployAction};
use nina_core::config::Config;
use std::process;
use tracing::info_span;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { &cli.log_level };
    if let Err(e) = nina_core::logging::init(level, &cli.log_format) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = dispatch(cli, &cfg).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn dispatch(cli: Cli, cfg: &Config) -> Result<()> {
    let client = ApiClient::new(cfg)?;
    match cli.command {
        Commands::Build { action: None } => {
            let _span = info_span!("cmd.build").entered();
            commands::build::handle(&client).await
        }
        Commands::Build { action: Some(BuildAction::Ls {}) } => {
            let _span = info_span!("cmd.build.ls").entered();
            commands::build::handle_ls(&client).await
        }
        Commands::Build { action: Some(BuildAction::Rm { id }) } => {
            let _span = info_span!("cmd.build.rm").entered();
            commands::build::handle_rm(&client, &id).await
        }
        Commands::Deploy { replicas, action: None } => {
            let _span = info_span!("cmd.deploy", replicas).entered();
            commands::deploy::handle(&client, replicas).await
        }
        Commands::Deploy { action: Some(DeployAction::Ls {}), .. } => {
            let _span = info_span!("cmd.deploy.ls").entered();
            commands::deploy::handle_ls(&client).await
        }
        Commands::Deploy { action: Some(DeployAction::Rm { id }), .. } => {
            let _span = info_span!("cmd.deploy.rm").entered();
            commands::deploy::handle_rm(&client, &id).await
        }
        Commands::Health {} => {
            let _span = info_span!("cmd.health").entered();
            commands::health::handle(&client).await
        }
        Commands::Status { id } => {
            let _span = info_span!("cmd.status").entered();
            commands::legacy::handle_status(&client, &id).await
        }
        Commands::List {} => {
            let _span = info_span!("cmd.list").entered();
            commands::legacy::handle_list(&client).await
        }
        Commands::Delete { id } => {
            let _span = info_span!("cmd.delete").entered();
            commands::legacy::handle_delete(&client, &id).await
        }
    }
}

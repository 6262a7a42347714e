mod cli;
mod commands;
mod logging;
mod output;
mod overrides;

use crate::cli::{Cli, Commands};
use clap::Parser;
use color_eyre::eyre::Result;
use mdk_core::config::loader::{load_config, load_config_file};
use mdk_core::config::models::ServiceConfig;
use mdk_core::WorkflowService;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let config = Arc::new(load_service_config(&cli).await?);
    let json = cli.json;

    match cli.command {
        Commands::Templates => commands::session::templates(json),
        Commands::Serve => commands::serve::run(config).await,
        command => {
            let (events_tx, events_rx) = mpsc::channel(256);
            let progress = commands::spawn_progress(events_rx, json);
            let service = WorkflowService::new(config, events_tx).await?;

            let result = run_command(&service, command, json).await;

            drop(service);
            let _ = progress.await;
            result
        }
    }
}

async fn run_command(service: &WorkflowService, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Create(args) => commands::workflow::create(service, args, json).await,
        Commands::List => commands::workflow::list(service, json).await,
        Commands::Show(args) => commands::workflow::show(service, args, json).await,
        Commands::Rename(args) => commands::workflow::rename(service, args, json).await,
        Commands::Delete(args) => commands::workflow::delete(service, args, json).await,
        Commands::Export(args) => commands::workflow::export(service, args, json).await,
        Commands::Import(args) => commands::workflow::import(service, args, json).await,
        Commands::Artifacts(args) => commands::workflow::artifacts(service, args, json).await,
        Commands::Advance(args) => commands::pipeline::advance(service, args, json).await,
        Commands::RunTo(args) => commands::pipeline::run_to(service, args, json).await,
        Commands::Analyze(args) => commands::pipeline::analyze(service, args, json).await,
        Commands::Params(args) => commands::pipeline::params(service, args, json).await,
        Commands::Logs(args) => commands::pipeline::logs(service, args).await,
        Commands::Session(args) => commands::session::session(service, args, json).await,
        Commands::Templates => commands::session::templates(json),
        Commands::Serve => commands::serve::run(Arc::clone(service.config())).await,
    }
}

/// Reads `--config` (or `./.mdkit/config.toml`) and applies `--workspace`.
async fn load_service_config(cli: &Cli) -> Result<ServiceConfig> {
    let cwd = std::env::current_dir()?;
    let mut config = match &cli.config {
        Some(path) => load_config_file(path).await?,
        None => load_config(&cwd).await?,
    };

    if let Some(workspace) = &cli.workspace {
        config = config.with_workspace_root(cwd.join(workspace));
    }
    Ok(config)
}

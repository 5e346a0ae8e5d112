//! Veritas CLI - run prompts through the inference pipeline

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use veritas_foundation::logging::{LogOptions, init_tracing};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
    });

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command(cli))
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.to_string_lossy().into_owned();
    tracing::debug!(config = %config, "Using configuration file");

    match cli.command {
        Commands::Run(args) => commands::run::run(&config, args).await,
        Commands::Models { json, health } => commands::models::run(&config, json, health).await,
        Commands::Check => commands::check::run(&config),
    }
}

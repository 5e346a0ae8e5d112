//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Veritas - consistency-checked, self-refining LLM inference
#[derive(Parser)]
#[command(name = "veritas")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file path
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "VERITAS_CONFIG",
        default_value = "veritas.yaml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one prompt through the pipeline
    Run(RunArgs),

    /// List the configured model registrations
    Models {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Probe each backend's health endpoint
        #[arg(long)]
        health: bool,
    },

    /// Validate the configuration file
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Prompt text
    #[arg(short, long)]
    pub prompt: String,

    /// Target a registered model id
    #[arg(short, long, conflicts_with = "capability")]
    pub model: Option<String>,

    /// Target any model declaring this capability
    #[arg(long)]
    pub capability: Option<String>,

    /// Number of consistency samples (defaults to the configured value)
    #[arg(short, long)]
    pub samples: Option<u32>,

    /// Expected output format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
    pub format: FormatArg,

    /// Keys a JSON object output must carry (with --format json)
    #[arg(long = "require-field", value_name = "KEY")]
    pub required_fields: Vec<String>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Overall time budget in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Print the full outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
    Code,
}

//! mendstream CLI: the main entry point.
//!
//! Commands:
//! - `classify` : Classify a stream failure and show the repair plan
//! - `inspect`  : Report orphaned tool calls in a conversation
//! - `replay`   : Run the retry controller against a scripted scenario
//! - `config`   : Show, locate, or initialize the configuration

use clap::{Parser, Subcommand};
use mendstream_core::WorkflowStep;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "mendstream",
    about = "mendstream: heal and retry interrupted LLM conversation steps",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a failure read from a JSON file
    Classify {
        /// Path to the failure JSON
        file: PathBuf,

        /// Workflow step the failure happened in
        #[arg(long)]
        step: Option<WorkflowStep>,

        /// Tools available in that step (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },

    /// Report orphaned tool calls and pairing violations in a conversation
    Inspect {
        /// Path to the conversation JSON (an array of messages)
        file: PathBuf,

        /// Print the conversation with every tool call followed by its result
        #[arg(long)]
        interleave: bool,
    },

    /// Run a scripted scenario through the retry controller
    Replay {
        /// Path to the scenario JSON
        file: PathBuf,

        /// Skip backoff sleeps
        #[arg(long)]
        no_delay: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Classify { file, step, tools } => commands::classify::run(&file, step, tools)?,
        Commands::Inspect { file, interleave } => commands::inspect::run(&file, interleave)?,
        Commands::Replay { file, no_delay } => commands::replay::run(&file, no_delay).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path()?,
            ConfigAction::Init { force } => commands::config_cmd::init(force)?,
        },
    }

    Ok(())
}

//! CLI definitions and dispatch.

mod config;
mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use convostate::StateConfig;

#[derive(Parser)]
#[command(name = "convostate", version, about = "Conversation state and response cache")]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.convostate/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Walk through a scripted ordering conversation against an in-process store
    Demo {
        /// Session ID to use (a UUID is generated when omitted)
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the effective configuration as JSON
    Config,
}

pub(crate) async fn run() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    convostate::logging::init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Demo { session } => demo::cmd_demo(config, session).await,
        Commands::Config => config::cmd_config(&config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<StateConfig> {
    match path {
        Some(path) => {
            let mut config = StateConfig::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
                .validate()
                .with_context(|| "Invalid configuration after environment overrides")?;
            Ok(config)
        }
        None => StateConfig::load().with_context(|| "Failed to load configuration"),
    }
}

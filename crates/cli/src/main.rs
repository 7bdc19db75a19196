//! Atelier CLI — the main entry point.
//!
//! Commands:
//! - `analyze` — Run one analysis over a workshop JSON file
//! - `status`  — Show configuration, tier health and engine capabilities
//! - `sweep`   — Delete expired memory entries once
//! - `memory`  — List stored memory entries of a mission
//! - `config`  — Print, locate or validate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "atelier",
    about = "Atelier — agent memory and analysis orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.atelier/config.toml
    #[arg(short, long, global = true, env = "ATELIER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a workshop JSON file and print the unified result
    Analyze {
        #[arg(short, long)]
        mission: String,

        #[arg(short, long)]
        agent: String,

        #[arg(short, long)]
        session: String,

        /// Owner of the user context (defaults to the agent)
        #[arg(short, long)]
        user: Option<String>,

        /// Workshop payload
        file: PathBuf,
    },

    /// Show configuration, tier health and engine capabilities
    Status,

    /// Delete expired entries from the warm and cold tiers
    Sweep,

    /// List memory entries of a mission
    Memory {
        #[arg(short, long)]
        mission: String,

        #[arg(short, long)]
        agent: Option<String>,

        #[arg(short, long)]
        session: Option<String>,

        /// context, interaction, analysis or preference
        #[arg(short, long)]
        kind: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration template
    Template,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Analyze {
            mission,
            agent,
            session,
            user,
            file,
        } => commands::analyze::run(config_path, mission, agent, session, user, &file).await?,
        Commands::Status => commands::status::run(config_path).await?,
        Commands::Sweep => commands::sweep::run(config_path).await?,
        Commands::Memory {
            mission,
            agent,
            session,
            kind,
            limit,
        } => commands::memory::list(config_path, &mission, agent, session, kind.as_deref(), limit).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Template) {
            ConfigAction::Template => commands::config_cmd::template(),
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(())
}

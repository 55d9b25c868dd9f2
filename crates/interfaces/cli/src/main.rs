mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quill_config::AppConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Parser)]
#[command(
    name = "quill",
    version,
    about = "Manuscript editing core: locate quotes, index lore, plan agent edits"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Find where a (possibly inexact) quote sits in a file.
    Locate {
        file: PathBuf,
        quote: String,
    },
    /// Rebuild the lore index from every .md/.txt chapter in a directory and
    /// report continuity conflicts.
    Index {
        dir: PathBuf,
        /// Project id the index is stored under (defaults to the directory name).
        #[arg(long)]
        project: Option<String>,
    },
    /// Plan an assistant tool call against a file.
    /// Example: quill agent ch1.md update_manuscript '{"search_text":"cat","replacement_text":"dog"}'
    Agent {
        file: PathBuf,
        action: String,
        /// Tool-call parameters as a JSON object.
        #[arg(default_value = "{}")]
        params: String,
        /// Write the proposed change back to the file.
        #[arg(long)]
        accept: bool,
    },
    /// Print tool schemas for the assistant actions.
    Tools,
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration.
    Show,
    /// Write the effective configuration to the config path.
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Locate { file, quote } => commands::run_locate(&file, &quote)?,
        Commands::Index { dir, project } => {
            commands::run_index(&config, &dir, project.as_deref()).await?
        }
        Commands::Agent {
            file,
            action,
            params,
            accept,
        } => commands::run_agent(&file, &action, &params, accept)?,
        Commands::Tools => commands::run_tools()?,
        Commands::Config(ConfigCommands::Show) => commands::run_config_show(&config)?,
        Commands::Config(ConfigCommands::Init) => {
            config.save_to(&cli.config)?;
            println!("wrote {}", cli.config.display());
        }
    }

    Ok(())
}

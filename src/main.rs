use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use venue_review::config::{CONFIG_FILE, CliOverrides, ServiceConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "venue-review")]
#[command(version, about = "Space submission and review workflow service")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Log filter directive (e.g. "venue_review=debug"). Overrides the config file.
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the review HTTP server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind on all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations, then exit
    InitDb {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Create a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut overrides = CliOverrides {
        log_filter: cli.log_filter.clone(),
        json_logs: cli.json_logs,
        ..Default::default()
    };
    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            overrides.port = *port;
            overrides.db_path = db_path.clone();
            overrides.dev_mode = *dev;
        }
        Commands::InitDb { db_path } => overrides.db_path = db_path.clone(),
        Commands::Config { .. } => {}
    }

    // `config init` must work even when the existing file is broken.
    if let Commands::Config {
        command: Some(ConfigCommands::Init),
    } = cli.command
    {
        return cmd::cmd_config_init(&cli.config);
    }

    let config = ServiceConfig::resolve(&cli.config, &overrides)?;
    venue_review::telemetry::init_logging(&config.logging)?;

    match cli.command {
        Commands::Serve { .. } => cmd::cmd_serve(&config).await?,
        Commands::InitDb { .. } => cmd::cmd_init_db(&config)?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command)?,
    }

    Ok(())
}

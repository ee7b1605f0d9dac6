//! Configuration view and validation commands: `venue-review config`.

use anyhow::{Context, Result};
use std::path::Path;

use venue_review::config::ServiceConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config_path: &Path,
    effective: &ServiceConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No config file at {}; using defaults", config_path.display());
            }
            println!("# Effective values (file, env and CLI overrides applied)");
            println!();
            let rendered =
                toml::to_string_pretty(effective).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", config_path.display());
                return Ok(());
            }

            let file = ServiceConfig::load(config_path)?;
            let warnings = file.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => cmd_config_init(config_path)?,
    }

    Ok(())
}

pub fn cmd_config_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("{} already exists.", config_path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    ServiceConfig::default().save(config_path)?;

    println!("Created {}", config_path.display());
    println!();
    println!("You can now customize:");
    println!("  - [server] host, port, dev_mode");
    println!("  - [database] path");
    println!("  - [logging] filter, json");
    Ok(())
}

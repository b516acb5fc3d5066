//! Configuration file commands

use std::path::{Path, PathBuf};

use alpaca_conform::ConformConfig;
use anyhow::{bail, Result};
use clap::Subcommand;

use crate::output::{print_success, OutputFormat};

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Write a configuration file holding every default
    Init {
        /// Destination file
        #[arg(default_value = "alpaca-conform.toml")]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(default_value = "alpaca-conform.toml")]
        path: PathBuf,
    },
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path, force } => {
            init(&path, force)?;
            print_success(&format!("Wrote default configuration to {}", path.display()));
        }
        ConfigCommands::Show { path } => {
            let config = ConformConfig::load(&path)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                _ => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
    }
    Ok(())
}

/// Write the default configuration to `path`
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to replace it", path.display());
    }
    ConformConfig::default().save(path)?;
    Ok(())
}

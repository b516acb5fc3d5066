//! Alpaca Conform CLI - Main Entry Point
//!
//! Checks that an Alpaca device driver honours the HTTP protocol: URL
//! structure, parameter casing, transaction id round trips, status codes and
//! the ImageBytes encoding.

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use alpaca_conform_cli::commands::{config, plan, run};
use alpaca_conform_cli::output::OutputFormat;

/// Alpaca Conform - Alpaca HTTP protocol conformance checker
#[derive(Parser)]
#[command(name = "alpaca-conform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the protocol checks against a device
    Run(run::RunArgs),

    /// List the steps of a device plan
    Plan(plan::PlanArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received interrupt, stopping after the current request");
                    trigger.cancel();
                }
            });

            let code = run::execute(args, cli.format, cancel).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Plan(args) => plan::execute(args, cli.format).await?,
        Commands::Config(cmd) => config::execute(cmd, cli.format).await?,
        Commands::Version => {
            println!("Alpaca Conform v{}", env!("CARGO_PKG_VERSION"));
            println!("Alpaca HTTP protocol conformance checker");
            println!();
            println!("User agent: {}", alpaca_conform_common::user_agent());
            println!(
                "Device types: {}",
                alpaca_conform_common::DeviceType::ALL
                    .iter()
                    .map(|t| t.api_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}

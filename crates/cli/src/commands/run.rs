//! Run command

use std::path::PathBuf;

use alpaca_conform::config::Scheme;
use alpaca_conform::{ConformConfig, ProtocolRunner};
use alpaca_conform_common::DeviceType;
use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::{print_report, OutputFormat};
use crate::status::SpinnerStatus;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Configuration file
    #[arg(short, long, default_value = "alpaca-conform.toml", env = "ALPACA_CONFORM_CONFIG")]
    pub config: PathBuf,

    /// Device host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// Alpaca server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Device type, e.g. focuser or telescope
    #[arg(short = 't', long)]
    pub device_type: Option<DeviceType>,

    /// Device number
    #[arg(short = 'n', long)]
    pub device_number: Option<u32>,

    /// Connect over HTTPS
    #[arg(long)]
    pub https: bool,

    /// Basic auth user name
    #[arg(long, env = "ALPACA_USERNAME")]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "ALPACA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Also send malformed URL structures and non-PUT verbs
    #[arg(long)]
    pub test_url_structure: bool,

    /// Directory of YAML plans overriding the built-in ones
    #[arg(long)]
    pub plans: Option<PathBuf>,

    /// Do not draw the live status spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl RunArgs {
    /// Load the configuration file and apply command line overrides
    pub fn resolve_config(&self) -> Result<ConformConfig> {
        let mut config = ConformConfig::load(&self.config)
            .with_context(|| format!("loading configuration from {}", self.config.display()))?;

        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if let Some(device_type) = self.device_type {
            config.device.device_type = device_type;
        }
        if let Some(number) = self.device_number {
            config.device.device_number = number;
        }
        if self.https {
            config.device.scheme = Scheme::Https;
        }
        if self.username.is_some() {
            config.alpaca.username = self.username.clone();
        }
        if self.password.is_some() {
            config.alpaca.password = self.password.clone();
        }
        if self.test_url_structure {
            config.alpaca.test_primary_url_structure = true;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Run the checks and return the process exit code
pub async fn execute(args: RunArgs, format: OutputFormat, cancel: CancellationToken) -> Result<i32> {
    let config = args.resolve_config()?;
    info!(
        device_type = %config.device.device_type,
        device_number = config.device.device_number,
        "starting protocol checks"
    );

    let status = if args.no_progress || format == OutputFormat::Json {
        SpinnerStatus::hidden()
    } else {
        SpinnerStatus::new()
    };

    let mut runner = ProtocolRunner::new(config, cancel).with_status_sink(Box::new(status));
    if let Some(dir) = &args.plans {
        runner = runner.with_plans_dir(dir);
    }
    let report = runner.run().await;

    if report.interrupted {
        warn!("run interrupted");
    }
    print_report(&report, format);
    Ok(exit_code(report.verdict()))
}

/// Verdict clamped to the range a process can report
pub fn exit_code(verdict: usize) -> i32 {
    verdict.min(255) as i32
}

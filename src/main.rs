//! wxm-bridge
//!
//! Fetch the current reading of a WeatherXM station and export it to MySQL
//! or Tago.io. One reading per invocation; schedule it with cron.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use wxm_core::{Config, ConfigError, Sink};
use wxm_export::ExportError;

/// Exit code for a reading that was already exported
const EXIT_DUPLICATE: u8 = 2;

#[derive(Parser)]
#[command(name = "wxm-bridge")]
#[command(author, version, about = "Forward WeatherXM station readings", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging, unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert the reading into the WeatherStationDL table
    Mysql,
    /// Post the reading to a Tago.io device
    Tago,
}

impl From<&Commands> for Sink {
    fn from(command: &Commands) -> Self {
        match command {
            Commands::Mysql => Sink::MySql,
            Commands::Tago => Sink::Tago,
        }
    }
}

fn load_config(path: Option<PathBuf>, sink: Sink) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    tracing::debug!("Loading config from {}", path.display());

    let (config, _) = Config::load_validated(&path, sink)?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = wxm_core::init(cli.verbose) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let sink = Sink::from(&cli.command);
    let config = match load_config(cli.config, sink) {
        Ok(config) => config,
        Err(e) => {
            match e.downcast_ref::<ConfigError>() {
                Some(config_error) => {
                    tracing::error!("{} {}", config_error.user_message(), config_error)
                }
                None => tracing::error!("Failed to load configuration: {:#}", e),
            }
            return ExitCode::FAILURE;
        }
    };

    match wxm_export::run(&config, sink).await {
        Ok(outcome) => {
            tracing::info!("{}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(&e),
    }
}

fn report_failure(error: &ExportError) -> ExitCode {
    if error.is_duplicate() {
        tracing::warn!("{}", error.user_message());
        return ExitCode::from(EXIT_DUPLICATE);
    }

    tracing::error!("{} ({})", error.user_message(), error);
    ExitCode::FAILURE
}

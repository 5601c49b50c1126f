pub mod config;
pub mod error;

pub use config::{
    Config, ConversionConfig, HttpConfig, MySqlConfig, Sink, TagoConfig, ValidationResult,
    WeatherXmConfig,
};
pub use error::ConfigError;

use anyhow::Result;

/// Initialize logging. `verbose` lowers the default filter to `debug`;
/// `RUST_LOG` always wins when set.
pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("wxm-bridge core initialized");
    Ok(())
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_WEATHERXM_BASE_URL: &str = "https://api.weatherxm.com/api/v1";
pub const DEFAULT_TAGO_BASE_URL: &str = "https://api.tago.io";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Join all errors into one line for the run diagnostic
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Which sink a run exports to. Validation depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    MySql,
    Tago,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Station identity and API endpoint
    #[serde(default)]
    pub weatherxm: WeatherXmConfig,

    /// Per-family unit conversion toggles
    #[serde(default)]
    pub conversions: ConversionConfig,

    /// MySQL sink connection
    #[serde(default)]
    pub mysql: MySqlConfig,

    /// Tago.io sink
    #[serde(default)]
    pub tago: TagoConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// WeatherXM station settings.
///
/// Leave `username` and `password` empty to use the public API. A station is
/// identified either by `station_name` or by `device_id` (plus `hex_id` for
/// the public API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherXmConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub station_name: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub hex_id: String,
    #[serde(default = "default_weatherxm_base_url")]
    pub base_url: String,
}

fn default_weatherxm_base_url() -> String {
    DEFAULT_WEATHERXM_BASE_URL.to_string()
}

impl Default for WeatherXmConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            station_name: String::new(),
            device_id: String::new(),
            hex_id: String::new(),
            base_url: default_weatherxm_base_url(),
        }
    }
}

impl WeatherXmConfig {
    /// Private API is used only when both credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Temperature, feels-like and dew point
    #[serde(default)]
    pub celsius_to_fahrenheit: bool,
    /// Wind speed and gust
    #[serde(default)]
    pub mps_to_mph: bool,
    /// Precipitation rate and accumulation
    #[serde(default)]
    pub mm_to_inch: bool,
    #[serde(default)]
    pub hpa_to_inhg: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
}

fn default_mysql_port() -> u16 {
    DEFAULT_MYSQL_PORT
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MYSQL_PORT,
            user: String::new(),
            password: String::new(),
            database: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagoConfig {
    /// Token of a Tago.io "Custom HTTPS" device
    #[serde(default)]
    pub device_token: String,
    #[serde(default = "default_tago_base_url")]
    pub base_url: String,
    /// Append battery and relay records (private API only)
    #[serde(default)]
    pub include_device_info: bool,
}

fn default_tago_base_url() -> String {
    DEFAULT_TAGO_BASE_URL.to_string()
}

impl Default for TagoConfig {
    fn default() -> Self {
        Self {
            device_token: String::new(),
            base_url: default_tago_base_url(),
            include_device_info: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Unset means requests block until the server answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Default location: `<config dir>/wxm-bridge/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wxm-bridge");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file, writing a default one if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration and validate it for the given sink
    pub fn load_validated(path: &Path, sink: Sink) -> Result<(Self, ValidationResult)> {
        let config = Self::load(path)?;
        let validation = config.validate_for(sink);

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the station settings plus whatever the sink needs
    pub fn validate_for(&self, sink: Sink) -> ValidationResult {
        let mut result = ValidationResult::default();
        let wxm = &self.weatherxm;

        validate_url(&wxm.base_url, "weatherxm.base_url", &mut result);

        if wxm.username.is_empty() != wxm.password.is_empty() {
            result.add_warning(
                "weatherxm",
                "Only one of username/password is set; falling back to the public API",
            );
        }

        if wxm.station_name.is_empty() {
            if wxm.device_id.is_empty() {
                result.add_error(
                    "weatherxm.station_name",
                    "A station name or device id is required",
                );
            } else if !wxm.has_credentials() && wxm.hex_id.is_empty() {
                result.add_error(
                    "weatherxm.hex_id",
                    "A hex id is required when using the public API by device id",
                );
            }
        }

        match sink {
            Sink::MySql => {
                let db = &self.mysql;
                if db.host.is_empty() {
                    result.add_error("mysql.host", "Database host is required");
                }
                if db.user.is_empty() {
                    result.add_error("mysql.user", "Database user is required");
                }
                if db.database.is_empty() {
                    result.add_error("mysql.database", "Database name is required");
                }
                if db.port == 0 {
                    result.add_error("mysql.port", "Port cannot be 0");
                }
            }
            Sink::Tago => {
                validate_url(&self.tago.base_url, "tago.base_url", &mut result);
                if self.tago.device_token.is_empty() {
                    result.add_error("tago.device_token", "Tago.io device token is required");
                }
                if self.tago.include_device_info && !wxm.has_credentials() {
                    result.add_warning(
                        "tago.include_device_info",
                        "Device info is only available through the private API",
                    );
                }
            }
        }

        if self.http.request_timeout_secs == Some(0) {
            result.add_error("http.request_timeout_secs", "Timeout must be greater than 0");
        }

        result
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }
            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}

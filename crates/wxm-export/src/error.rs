//! Export run error types.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use wxm_core::ConfigError;
use wxm_weather::WeatherXmError;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("WeatherXM error: {0}")]
    WeatherXm(#[from] WeatherXmError),

    #[error("Duplicate weather data received (timestamp {0}). Try again later.")]
    DuplicateData(DateTime<FixedOffset>),

    #[error("Tago.io request failed with code {status}: {message}")]
    Sink { status: u16, message: String },

    #[error("Invalid Tago.io response: {0}")]
    SinkResponse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ExportError {
    /// User-friendly error message for the run diagnostic.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message().to_string(),
            Self::WeatherXm(e) => e.user_message(),
            Self::DuplicateData(_) => {
                "Station has not reported since the last export. Nothing sent.".to_string()
            }
            Self::Sink { status, .. } => format!("Tago.io rejected the request ({}).", status),
            Self::SinkResponse(_) => "Tago.io returned an unexpected response.".to_string(),
            Self::Database(_) => "Writing to the database failed. Nothing was stored.".to_string(),
            Self::Network(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// Duplicate data is an expected outcome when polling faster than the
    /// station reports.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateData(_))
    }
}

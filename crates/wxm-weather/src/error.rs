//! WeatherXM API error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherXmError {
    #[error("Login failed with code {0}")]
    Auth(u16),

    #[error("Station not found: {0}")]
    NotFound(String),

    #[error("Query failed with code {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid WeatherXM response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl WeatherXmError {
    /// User-friendly error message for the run diagnostic.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(status) => format!(
                "WeatherXM login was rejected ({}). Check username and password.",
                status
            ),
            Self::NotFound(what) => format!("No WeatherXM station matches {}", what),
            Self::Http { status, .. } => format!("WeatherXM request failed ({}).", status),
            Self::Parse(_) => "WeatherXM returned an unexpected response.".to_string(),
            Self::Network(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// HTTP status behind the failure, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth(status) | Self::Http { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::NotFound(_) | Self::Parse(_) => None,
        }
    }
}

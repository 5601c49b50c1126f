//! WeatherXM station access for wxm-bridge
//!
//! Fetches the current weather of a single station through the private
//! (authenticated) or public WeatherXM API, and converts readings into the
//! configured units.

pub mod client;
pub mod error;
pub mod types;
pub mod units;

pub use client::{station_names_match, WeatherXmClient};
pub use error::WeatherXmError;
pub use types::*;
pub use units::{cardinal_direction, two_decimals, ConvertedReading, Units};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::WeatherXmError;

/// Station model whose devices report the relay they last transmitted through
pub const HELIUM_PROFILE: &str = "Helium";

/// Current conditions as reported by a station, in WeatherXM's native units
/// (°C, m/s, mm, hPa).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<FixedOffset>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    /// Degrees, 0 = north
    pub wind_direction: f64,
    pub uv_index: f64,
    /// Rate, mm/h
    pub precipitation: f64,
    pub precipitation_accumulated: f64,
    pub pressure: f64,
    /// Condition code, e.g. "partly-cloudy-day"
    pub icon: String,
    pub feels_like: f64,
    /// W/m²
    pub solar_irradiance: f64,
    pub dew_point: f64,
}

/// Hardware state reported alongside a private-API reading
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceInfo {
    pub battery_state: Option<String>,
    pub profile: Option<String>,
    /// Name of the hotspot that relayed the last packet (Helium only)
    pub last_relay: Option<String>,
    /// Received signal strength of the last packet in dBm (Helium only)
    pub rssi: Option<f64>,
}

impl DeviceInfo {
    pub fn is_helium(&self) -> bool {
        self.profile.as_deref() == Some(HELIUM_PROFILE)
    }
}

/// One fetched reading plus, for private fetches, the device's hardware state
#[derive(Debug, Clone, PartialEq)]
pub struct StationReport {
    pub reading: Reading,
    pub device_info: Option<DeviceInfo>,
}

/// Identifiers needed by the public API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicStationIds {
    pub hex_cell_id: String,
    pub device_id: String,
}

/// Session token returned by login. Lives for one run only.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

// API Request/Response Types

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogoutRequest<'a> {
    pub access_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub devices: Vec<SearchDevice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchDevice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub cell_index: String,
}

/// Device as returned by `/me/devices`, `/me/devices/{id}` and
/// `/cells/{hex}/devices/{id}`. The weather payload stays untyped until the
/// device is picked so one malformed neighbour cannot fail a whole listing.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiDevice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub bat_state: Option<String>,
    #[serde(default)]
    pub attributes: Option<ApiDeviceAttributes>,
    #[serde(default)]
    pub current_weather: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiDeviceAttributes {
    #[serde(default)]
    pub last_hs: Option<ApiRelay>,
    #[serde(default)]
    pub last_tx_rssi: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRelay {
    pub name: String,
}

impl ApiDevice {
    fn device_info(&self) -> DeviceInfo {
        let attributes = self.attributes.as_ref();
        DeviceInfo {
            battery_state: self.bat_state.clone(),
            profile: self.profile.clone(),
            last_relay: attributes
                .and_then(|a| a.last_hs.as_ref())
                .map(|relay| relay.name.clone()),
            rssi: attributes.and_then(|a| a.last_tx_rssi),
        }
    }

    pub(crate) fn into_report(self, with_device_info: bool) -> Result<StationReport, WeatherXmError> {
        let device_info = with_device_info.then(|| self.device_info());
        let weather = self.current_weather.ok_or_else(|| {
            WeatherXmError::Parse(format!("device {} has no current weather", self.id))
        })?;
        let reading: Reading = serde_json::from_value(weather)
            .map_err(|e| WeatherXmError::Parse(format!("current_weather: {}", e)))?;

        Ok(StationReport {
            reading,
            device_info,
        })
    }
}

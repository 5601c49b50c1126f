//! Picks how the station is fetched from the `[weatherxm]` settings.

use wxm_core::{ConfigError, WeatherXmConfig};
use wxm_weather::{StationReport, WeatherXmClient};

use crate::error::ExportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationSource {
    PrivateByDeviceId { device_id: String },
    PrivateByName { station_name: String },
    PublicByIds { hex_cell_id: String, device_id: String },
    PublicByName { station_name: String },
}

impl StationSource {
    /// Credentials select the private API. A device id wins over a station
    /// name; the public API needs the hex id as well to skip the search.
    pub fn from_config(config: &WeatherXmConfig) -> Result<Self, ConfigError> {
        let has_device = !config.device_id.is_empty();
        let has_name = !config.station_name.is_empty();

        if config.has_credentials() {
            if has_device {
                return Ok(Self::PrivateByDeviceId {
                    device_id: config.device_id.clone(),
                });
            }
            if has_name {
                return Ok(Self::PrivateByName {
                    station_name: config.station_name.clone(),
                });
            }
        } else {
            if has_device && !config.hex_id.is_empty() {
                return Ok(Self::PublicByIds {
                    hex_cell_id: config.hex_id.clone(),
                    device_id: config.device_id.clone(),
                });
            }
            if has_name {
                return Ok(Self::PublicByName {
                    station_name: config.station_name.clone(),
                });
            }
        }

        Err(ConfigError::MissingSetting(
            "weatherxm.station_name (or device_id/hex_id)".to_string(),
        ))
    }

    pub fn is_private(&self) -> bool {
        matches!(
            self,
            Self::PrivateByDeviceId { .. } | Self::PrivateByName { .. }
        )
    }
}

/// Fetch the station's current report. Private fetches log in first and log
/// out exactly once, whether the fetch succeeds or fails.
pub async fn fetch_report(
    client: &WeatherXmClient,
    config: &WeatherXmConfig,
) -> Result<StationReport, ExportError> {
    let source = StationSource::from_config(config)?;
    tracing::info!("Fetching station via {:?}", source);
    if !source.is_private() {
        tracing::debug!("Public source, device info will not be available");
    }

    let report = match source {
        StationSource::PrivateByDeviceId { device_id } => {
            let token = client.login(&config.username, &config.password).await?;
            // a failed fetch has already logged out
            let report = client.fetch_private_by_device_id(&device_id, &token).await?;
            client.logout(&token).await;
            report
        }
        StationSource::PrivateByName { station_name } => {
            let token = client.login(&config.username, &config.password).await?;
            let report = client.fetch_private_by_name(&station_name, &token).await?;
            client.logout(&token).await;
            report
        }
        StationSource::PublicByIds {
            hex_cell_id,
            device_id,
        } => client.fetch_public(&hex_cell_id, &device_id).await?,
        StationSource::PublicByName { station_name } => {
            let ids = client.resolve_public_ids_by_name(&station_name).await?;
            client.fetch_public(&ids.hex_cell_id, &ids.device_id).await?
        }
    };

    tracing::info!("Received reading from {}", report.reading.timestamp);
    Ok(report)
}

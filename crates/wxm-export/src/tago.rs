//! Tago.io export: one timestamped record per reading field, skipped when the
//! station has not reported since the last export.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use wxm_core::{ConversionConfig, HttpConfig, TagoConfig};
use wxm_weather::{two_decimals, ConvertedReading, DeviceInfo, StationReport};

use crate::error::ExportError;

/// Variable whose last timestamp decides whether a reading was already sent
pub const REFERENCE_VARIABLE: &str = "temperature";

const DEVICE_TOKEN_HEADER: &str = "device-token";

/// One entry of the `POST /data` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagoRecord {
    pub variable: &'static str,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub time: String,
}

impl TagoRecord {
    fn new(variable: &'static str, value: Value, unit: Option<&str>, time: &str) -> Self {
        Self {
            variable,
            value,
            unit: unit.map(str::to_string),
            time: time.to_string(),
        }
    }

    fn measured(variable: &'static str, value: f64, unit: &str, time: &str) -> Self {
        Self::new(variable, Value::String(two_decimals(value)), Some(unit), time)
    }
}

#[derive(Debug, Deserialize)]
struct LastItemResponse {
    #[serde(default)]
    result: Vec<LastItem>,
}

#[derive(Debug, Deserialize)]
struct LastItem {
    time: String,
}

/// Raw fields go out as received: whole numbers stay integers.
fn raw_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// True when the new reading carries the same instant as the last record.
/// Both sides are compared in UTC, so `Z` and `+00:00` are equivalent.
pub fn is_duplicate(new: &DateTime<FixedOffset>, last: Option<&DateTime<FixedOffset>>) -> bool {
    last.is_some_and(|last| last.with_timezone(&Utc) == new.with_timezone(&Utc))
}

/// Build the payload for one converted reading. Device records are added
/// only when `device_info` is given: battery state for every model, relay
/// name and RSSI for Helium stations.
pub fn build_records(reading: &ConvertedReading, device_info: Option<&DeviceInfo>) -> Vec<TagoRecord> {
    let time = reading.timestamp.to_rfc3339();
    let units = &reading.units;
    let precipitation_rate = format!("{}/h", units.precipitation);

    let mut records = vec![
        TagoRecord::measured("temperature", reading.temperature, units.temperature, &time),
        TagoRecord::new("humidity", raw_number(reading.humidity), Some("%"), &time),
        TagoRecord::measured("wind_speed", reading.wind_speed, units.wind_speed, &time),
        TagoRecord::measured("wind_gust", reading.wind_gust, units.wind_speed, &time),
        TagoRecord::new(
            "wind_direction",
            raw_number(reading.wind_direction_degrees),
            Some("°"),
            &time,
        ),
        TagoRecord::new(
            "wind_direction_cardinal",
            Value::from(reading.wind_direction_cardinal),
            None,
            &time,
        ),
        TagoRecord::new("uv_index", raw_number(reading.uv_index), None, &time),
        TagoRecord::measured("precipitation", reading.precipitation, &precipitation_rate, &time),
        TagoRecord::measured(
            "precipitation_accumulated",
            reading.precipitation_accumulated,
            units.precipitation,
            &time,
        ),
        TagoRecord::measured("pressure", reading.pressure, units.pressure, &time),
        TagoRecord::measured("feels_like", reading.feels_like, units.temperature, &time),
        TagoRecord::measured("solar_irradiance", reading.solar_irradiance, "w/m²", &time),
        TagoRecord::measured("dew_point", reading.dew_point, units.temperature, &time),
        TagoRecord::new("icon", Value::from(reading.icon.as_str()), None, &time),
    ];

    if let Some(info) = device_info {
        match &info.battery_state {
            Some(battery) => records.push(TagoRecord::new(
                "battery_state",
                Value::from(battery.as_str()),
                None,
                &time,
            )),
            None => tracing::debug!("Device reported no battery state, skipping battery_state"),
        }
        if info.is_helium() {
            if let Some(relay) = &info.last_relay {
                records.push(TagoRecord::new(
                    "last_relay",
                    Value::from(relay.as_str()),
                    None,
                    &time,
                ));
            }
            if let Some(rssi) = info.rssi {
                records.push(TagoRecord::new("rssi", raw_number(rssi), Some("dBm"), &time));
            }
        }
    }

    records
}

/// Tago.io device-token client.
#[derive(Clone)]
pub struct TagoClient {
    client: Client,
    base_url: String,
    device_token: String,
}

impl std::fmt::Debug for TagoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagoClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TagoClient {
    pub fn new(
        base_url: &str,
        device_token: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, ExportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_token: device_token.to_string(),
        })
    }

    pub fn from_config(config: &TagoConfig, http: &HttpConfig) -> Result<Self, ExportError> {
        Self::new(
            &config.base_url,
            &config.device_token,
            http.request_timeout_secs.map(Duration::from_secs),
        )
    }

    /// Timestamp of the newest stored value of `variable`, if any.
    #[instrument(skip(self), level = "info")]
    pub async fn last_timestamp(
        &self,
        variable: &str,
    ) -> Result<Option<DateTime<FixedOffset>>, ExportError> {
        let url = format!("{}/data", self.base_url);
        tracing::debug!("GET {}?query=last_item&variable={}", url, variable);

        let response = self
            .client
            .get(&url)
            .header(DEVICE_TOKEN_HEADER, &self.device_token)
            .query(&[("query", "last_item"), ("variable", variable)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Tago.io query failed with code: {}", status.as_u16());
            return Err(ExportError::Sink {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: LastItemResponse = response
            .json()
            .await
            .map_err(|e| ExportError::SinkResponse(format!("JSON parse error: {}", e)))?;

        body.result
            .first()
            .map(|item| {
                DateTime::parse_from_rfc3339(&item.time).map_err(|e| {
                    ExportError::SinkResponse(format!("bad timestamp '{}': {}", item.time, e))
                })
            })
            .transpose()
    }

    /// Post a batch of records. Returns Tago's response body.
    #[instrument(skip_all, fields(records = records.len()), level = "info")]
    pub async fn send(&self, records: &[TagoRecord]) -> Result<String, ExportError> {
        let url = format!("{}/data", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(DEVICE_TOKEN_HEADER, &self.device_token)
            .json(records)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::error!("Tago.io post failed with code: {}", status.as_u16());
            return Err(ExportError::Sink {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(text)
    }
}

/// Converts a report, guards against re-sending, and posts it.
#[derive(Debug)]
pub struct TagoExporter {
    client: TagoClient,
    conversions: ConversionConfig,
    include_device_info: bool,
}

impl TagoExporter {
    pub fn new(client: TagoClient, conversions: ConversionConfig, include_device_info: bool) -> Self {
        Self {
            client,
            conversions,
            include_device_info,
        }
    }

    pub fn from_config(
        tago: &TagoConfig,
        conversions: ConversionConfig,
        http: &HttpConfig,
    ) -> Result<Self, ExportError> {
        Ok(Self::new(
            TagoClient::from_config(tago, http)?,
            conversions,
            tago.include_device_info,
        ))
    }

    /// Returns the number of records posted.
    pub async fn export(&self, report: &StationReport) -> Result<usize, ExportError> {
        let timestamp = report.reading.timestamp;
        let last = self.client.last_timestamp(REFERENCE_VARIABLE).await?;
        if is_duplicate(&timestamp, last.as_ref()) {
            tracing::warn!("Duplicate weather data received. Try again later.");
            return Err(ExportError::DuplicateData(timestamp));
        }

        let converted = ConvertedReading::new(&report.reading, &self.conversions);
        let device_info = if self.include_device_info {
            if report.device_info.is_none() {
                tracing::debug!("No device info available for this source");
            }
            report.device_info.as_ref()
        } else {
            None
        };

        let records = build_records(&converted, device_info);
        let body = self.client.send(&records).await?;
        tracing::info!("Tago.io accepted {} records: {}", records.len(), body);

        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use wxm_weather::Reading;

    fn reading(timestamp: &str) -> Reading {
        Reading {
            timestamp: DateTime::parse_from_rfc3339(timestamp).unwrap(),
            temperature: 12.345,
            humidity: 81.0,
            wind_speed: 3.2,
            wind_gust: 5.1,
            wind_direction: 200.0,
            uv_index: 2.0,
            precipitation: 0.0,
            precipitation_accumulated: 4.3,
            pressure: 1013.25,
            icon: "partly-cloudy-day".to_string(),
            feels_like: 11.0,
            solar_irradiance: 310.4,
            dew_point: 9.3,
        }
    }

    fn helium() -> DeviceInfo {
        DeviceInfo {
            battery_state: Some("ok".to_string()),
            profile: Some("Helium".to_string()),
            last_relay: Some("Tall Ruby Hamster".to_string()),
            rssi: Some(-97.0),
        }
    }

    fn record<'a>(records: &'a [TagoRecord], variable: &str) -> Option<&'a TagoRecord> {
        records.iter().find(|r| r.variable == variable)
    }

    #[test]
    fn test_is_duplicate_normalizes_offsets() {
        let new = DateTime::parse_from_rfc3339("2023-04-11T08:59:46-05:00").unwrap();
        let same_zulu = DateTime::parse_from_rfc3339("2023-04-11T13:59:46Z").unwrap();
        let same_plus = DateTime::parse_from_rfc3339("2023-04-11T13:59:46+00:00").unwrap();
        let later = DateTime::parse_from_rfc3339("2023-04-11T13:59:47Z").unwrap();

        assert!(is_duplicate(&new, Some(&same_zulu)));
        assert!(is_duplicate(&new, Some(&same_plus)));
        assert!(!is_duplicate(&later, Some(&same_zulu)));
        assert!(!is_duplicate(&new, None));
    }

    #[test]
    fn test_build_records_formats_values() {
        let converted = ConvertedReading::new(
            &reading("2023-04-11T08:59:46-05:00"),
            &ConversionConfig::default(),
        );
        let records = build_records(&converted, None);

        assert_eq!(records.len(), 14);
        assert_eq!(records[0].variable, "temperature");
        assert_eq!(records[13].variable, "icon");

        let temperature = record(&records, "temperature").unwrap();
        assert_eq!(temperature.value, Value::from("12.35"));
        assert_eq!(temperature.unit.as_deref(), Some("°C"));
        assert_eq!(temperature.time, "2023-04-11T08:59:46-05:00");

        assert_eq!(record(&records, "humidity").unwrap().value, Value::from(81));
        assert_eq!(record(&records, "uv_index").unwrap().value, Value::from(2));
        assert_eq!(record(&records, "wind_direction").unwrap().value, Value::from(200));
        assert_eq!(
            record(&records, "wind_direction_cardinal").unwrap().value,
            Value::from("SSW")
        );
        assert_eq!(
            record(&records, "precipitation").unwrap().unit.as_deref(),
            Some("mm/h")
        );
        assert_eq!(record(&records, "pressure").unwrap().value, Value::from("1013.25"));
        assert!(record(&records, "icon").unwrap().unit.is_none());
    }

    #[test]
    fn test_build_records_serializes_without_empty_unit() {
        let converted = ConvertedReading::new(
            &reading("2023-04-11T08:59:46-05:00"),
            &ConversionConfig::default(),
        );
        let records = build_records(&converted, None);
        let json = serde_json::to_value(record(&records, "uv_index").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "variable": "uv_index",
                "value": 2,
                "time": "2023-04-11T08:59:46-05:00"
            })
        );
    }

    #[test]
    fn test_build_records_converted_units() {
        let conversions = ConversionConfig {
            celsius_to_fahrenheit: true,
            mps_to_mph: true,
            mm_to_inch: true,
            hpa_to_inhg: true,
        };
        let converted = ConvertedReading::new(&reading("2023-04-11T08:59:46-05:00"), &conversions);
        let records = build_records(&converted, None);

        assert_eq!(record(&records, "temperature").unwrap().unit.as_deref(), Some("°F"));
        assert_eq!(record(&records, "wind_gust").unwrap().unit.as_deref(), Some("MPH"));
        assert_eq!(
            record(&records, "precipitation").unwrap().unit.as_deref(),
            Some("in/h")
        );
        assert_eq!(record(&records, "pressure").unwrap().value, Value::from("29.92"));
        assert_eq!(record(&records, "dew_point").unwrap().unit.as_deref(), Some("°F"));
    }

    #[test]
    fn test_build_records_helium_device_info() {
        let converted = ConvertedReading::new(
            &reading("2023-04-11T08:59:46-05:00"),
            &ConversionConfig::default(),
        );
        let info = helium();
        let records = build_records(&converted, Some(&info));

        assert_eq!(records.len(), 17);
        assert_eq!(record(&records, "battery_state").unwrap().value, Value::from("ok"));
        assert_eq!(
            record(&records, "last_relay").unwrap().value,
            Value::from("Tall Ruby Hamster")
        );
        assert_eq!(record(&records, "rssi").unwrap().value, Value::from(-97));
    }

    #[test]
    fn test_build_records_other_model_only_battery() {
        let converted = ConvertedReading::new(
            &reading("2023-04-11T08:59:46-05:00"),
            &ConversionConfig::default(),
        );
        let info = DeviceInfo {
            profile: Some("M5".to_string()),
            ..helium()
        };
        let records = build_records(&converted, Some(&info));

        assert_eq!(records.len(), 15);
        assert!(record(&records, "battery_state").is_some());
        assert!(record(&records, "last_relay").is_none());
        assert!(record(&records, "rssi").is_none());
    }

    #[test]
    fn test_build_records_without_battery_state() {
        let converted = ConvertedReading::new(
            &reading("2023-04-11T08:59:46-05:00"),
            &ConversionConfig::default(),
        );
        let info = DeviceInfo {
            battery_state: None,
            ..helium()
        };
        let records = build_records(&converted, Some(&info));

        assert_eq!(records.len(), 16);
        assert!(record(&records, "battery_state").is_none());
        assert!(record(&records, "last_relay").is_some());
        assert_eq!(records[14].variable, "last_relay");
    }

    async fn mount_last_item(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(query_param("query", "last_item"))
            .and(query_param("variable", "temperature"))
            .and(header("device-token", "dev-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn exporter(server: &MockServer, include_device_info: bool) -> TagoExporter {
        let client = TagoClient::new(&server.uri(), "dev-token", None).unwrap();
        TagoExporter::new(client, ConversionConfig::default(), include_device_info)
    }

    fn report(timestamp: &str, device_info: Option<DeviceInfo>) -> StationReport {
        StationReport {
            reading: reading(timestamp),
            device_info,
        }
    }

    #[tokio::test]
    async fn test_last_timestamp_empty_result() {
        let server = MockServer::start().await;
        mount_last_item(&server, serde_json::json!({ "status": true, "result": [] })).await;

        let client = TagoClient::new(&server.uri(), "dev-token", None).unwrap();
        let last = client.last_timestamp(REFERENCE_VARIABLE).await.unwrap();
        assert!(last.is_none());
    }

    #[tokio::test]
    async fn test_last_timestamp_query_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Authorization denied"))
            .mount(&server)
            .await;

        let client = TagoClient::new(&server.uri(), "dev-token", None).unwrap();
        let result = client.last_timestamp(REFERENCE_VARIABLE).await;
        assert!(matches!(result, Err(ExportError::Sink { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_export_skips_duplicate() {
        let server = MockServer::start().await;
        mount_last_item(
            &server,
            serde_json::json!({
                "status": true,
                "result": [{ "variable": "temperature", "value": "12.35", "time": "2023-04-11T13:59:46.000Z" }]
            }),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = exporter(&server, false)
            .export(&report("2023-04-11T08:59:46-05:00", None))
            .await;

        assert!(matches!(result, Err(ExportError::DuplicateData(_))));
    }

    #[tokio::test]
    async fn test_export_sends_newer_reading() {
        let server = MockServer::start().await;
        mount_last_item(
            &server,
            serde_json::json!({
                "status": true,
                "result": [{ "variable": "temperature", "time": "2023-04-11T13:59:46Z" }]
            }),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/data"))
            .and(header("device-token", "dev-token"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "status": true,
                "result": "17 Data Added"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sent = exporter(&server, true)
            .export(&report("2023-04-11T08:59:47-05:00", Some(helium())))
            .await
            .unwrap();

        assert_eq!(sent, 17);
    }

    #[tokio::test]
    async fn test_export_without_device_info_toggle() {
        let server = MockServer::start().await;
        mount_last_item(&server, serde_json::json!({ "status": true, "result": [] })).await;

        Mock::given(method("POST"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let sent = exporter(&server, false)
            .export(&report("2023-04-11T08:59:46-05:00", Some(helium())))
            .await
            .unwrap();

        assert_eq!(sent, 14);
    }

    #[tokio::test]
    async fn test_export_post_rejected() {
        let server = MockServer::start().await;
        mount_last_item(&server, serde_json::json!({ "status": true, "result": [] })).await;

        Mock::given(method("POST"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .mount(&server)
            .await;

        let result = exporter(&server, false)
            .export(&report("2023-04-11T08:59:46-05:00", None))
            .await;

        assert!(matches!(result, Err(ExportError::Sink { status: 400, .. })));
    }
}

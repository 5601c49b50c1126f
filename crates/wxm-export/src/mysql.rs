//! MySQL export: one row per run into `WeatherStationDL`.

use chrono::{NaiveDateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use wxm_core::{ConversionConfig, MySqlConfig};
use wxm_weather::{two_decimals, ConvertedReading, StationReport};

use crate::error::ExportError;

pub const TABLE: &str = "WeatherStationDL";

pub const COLUMNS: [&str; 15] = [
    "datetime",
    "temperature",
    "feels_like",
    "humidity",
    "wind_speed",
    "wind_gust",
    "wind_direction",
    "wind_direction_degrees",
    "uv_index",
    "precipitation",
    "pressure",
    "conditions",
    "precipitation_accumulated",
    "solar_irradiance",
    "dew_point",
];

pub fn insert_sql() -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TABLE,
        COLUMNS.join(", "),
        vec!["?"; COLUMNS.len()].join(", ")
    )
}

/// Values bound to [`insert_sql`], in column order. Measured values are
/// fixed to two decimals; the datetime is UTC without an offset.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub datetime: NaiveDateTime,
    pub temperature: String,
    pub feels_like: String,
    pub humidity: f64,
    pub wind_speed: String,
    pub wind_gust: String,
    pub wind_direction: &'static str,
    pub wind_direction_degrees: f64,
    pub uv_index: f64,
    pub precipitation: String,
    pub pressure: String,
    pub conditions: String,
    pub precipitation_accumulated: String,
    pub solar_irradiance: String,
    pub dew_point: String,
}

impl From<&ConvertedReading> for InsertRow {
    fn from(reading: &ConvertedReading) -> Self {
        Self {
            datetime: reading.timestamp.with_timezone(&Utc).naive_utc(),
            temperature: two_decimals(reading.temperature),
            feels_like: two_decimals(reading.feels_like),
            humidity: reading.humidity,
            wind_speed: two_decimals(reading.wind_speed),
            wind_gust: two_decimals(reading.wind_gust),
            wind_direction: reading.wind_direction_cardinal,
            wind_direction_degrees: reading.wind_direction_degrees,
            uv_index: reading.uv_index,
            precipitation: two_decimals(reading.precipitation),
            pressure: two_decimals(reading.pressure),
            conditions: reading.icon.clone(),
            precipitation_accumulated: two_decimals(reading.precipitation_accumulated),
            solar_irradiance: two_decimals(reading.solar_irradiance),
            dew_point: two_decimals(reading.dew_point),
        }
    }
}

#[derive(Debug)]
pub struct MySqlExporter {
    options: MySqlConnectOptions,
    conversions: ConversionConfig,
}

impl MySqlExporter {
    pub fn new(options: MySqlConnectOptions, conversions: ConversionConfig) -> Self {
        Self {
            options,
            conversions,
        }
    }

    pub fn from_config(config: &MySqlConfig, conversions: ConversionConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        Self::new(options, conversions)
    }

    /// Insert the report. Returns the affected-row count.
    pub async fn export(&self, report: &StationReport) -> Result<u64, ExportError> {
        let converted = ConvertedReading::new(&report.reading, &self.conversions);
        let row = InsertRow::from(&converted);
        tracing::debug!("Inserting {:?}", row);

        let mut conn = MySqlConnection::connect_with(&self.options).await?;
        let result = Self::insert(&mut conn, &row).await;

        if let Err(e) = conn.close().await {
            tracing::warn!("Closing database connection failed: {}", e);
        }

        let rows = result?;
        tracing::info!("{} record inserted.", rows);
        Ok(rows)
    }

    /// Runs in a transaction; an error drops it uncommitted, which rolls back.
    async fn insert(conn: &mut MySqlConnection, row: &InsertRow) -> Result<u64, sqlx::Error> {
        let sql = insert_sql();
        let mut tx = conn.begin().await?;

        let done = sqlx::query(&sql)
            .bind(row.datetime)
            .bind(row.temperature.as_str())
            .bind(row.feels_like.as_str())
            .bind(row.humidity)
            .bind(row.wind_speed.as_str())
            .bind(row.wind_gust.as_str())
            .bind(row.wind_direction)
            .bind(row.wind_direction_degrees)
            .bind(row.uv_index)
            .bind(row.precipitation.as_str())
            .bind(row.pressure.as_str())
            .bind(row.conditions.as_str())
            .bind(row.precipitation_accumulated.as_str())
            .bind(row.solar_irradiance.as_str())
            .bind(row.dew_point.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};
    use wxm_weather::Reading;

    fn reading() -> Reading {
        Reading {
            timestamp: DateTime::parse_from_rfc3339("2023-04-11T08:59:46-05:00").unwrap(),
            temperature: 21.456,
            humidity: 64.0,
            wind_speed: 2.0,
            wind_gust: 4.5,
            wind_direction: 95.0,
            uv_index: 5.0,
            precipitation: 1.2,
            precipitation_accumulated: 12.7,
            pressure: 1009.8,
            icon: "rain".to_string(),
            feels_like: 20.0,
            solar_irradiance: 512.33333,
            dew_point: 14.05,
        }
    }

    #[test]
    fn test_insert_sql_has_placeholder_per_column() {
        let sql = insert_sql();
        assert!(sql.starts_with("INSERT INTO WeatherStationDL (datetime, temperature,"));
        assert_eq!(sql.matches('?').count(), COLUMNS.len());
        assert!(!sql.contains("rain"));
    }

    #[test]
    fn test_insert_row_normalizes_to_utc() {
        let converted = ConvertedReading::new(&reading(), &ConversionConfig::default());
        let row = InsertRow::from(&converted);

        let expected = NaiveDate::from_ymd_opt(2023, 4, 11)
            .unwrap()
            .and_hms_opt(13, 59, 46)
            .unwrap();
        assert_eq!(row.datetime, expected);
    }

    #[test]
    fn test_insert_row_two_decimal_contract() {
        let converted = ConvertedReading::new(&reading(), &ConversionConfig::default());
        let row = InsertRow::from(&converted);

        assert_eq!(row.temperature, "21.46");
        assert_eq!(row.wind_speed, "2.00");
        assert_eq!(row.solar_irradiance, "512.33");
        assert_eq!(row.pressure, "1009.80");
        assert_eq!(row.wind_direction, "E");
        assert_eq!(row.wind_direction_degrees, 95.0);
        assert_eq!(row.humidity, 64.0);
        assert_eq!(row.conditions, "rain");
    }

    #[test]
    fn test_insert_row_uses_converted_values() {
        let conversions = ConversionConfig {
            celsius_to_fahrenheit: true,
            mm_to_inch: true,
            ..ConversionConfig::default()
        };
        let converted = ConvertedReading::new(&reading(), &conversions);
        let row = InsertRow::from(&converted);

        assert_eq!(row.feels_like, "68.00");
        assert_eq!(row.precipitation_accumulated, "0.50");
        assert_eq!(row.wind_speed, "2.00");
    }

    #[test]
    fn test_from_config_sets_connection_options() {
        let config = MySqlConfig {
            host: "192.168.1.201".to_string(),
            port: 6603,
            user: "weather".to_string(),
            password: "secret".to_string(),
            database: "station".to_string(),
        };
        let exporter = MySqlExporter::from_config(&config, ConversionConfig::default());

        assert_eq!(exporter.options.get_host(), "192.168.1.201");
        assert_eq!(exporter.options.get_port(), 6603);
        assert_eq!(exporter.options.get_database(), Some("station"));
    }

    #[tokio::test]
    async fn test_export_unreachable_database_is_error() {
        let options = MySqlConnectOptions::new().host("127.0.0.1").port(1);
        let exporter = MySqlExporter::new(options, ConversionConfig::default());
        let report = StationReport {
            reading: reading(),
            device_info: None,
        };

        let result = exporter.export(&report).await;
        assert!(matches!(result, Err(ExportError::Database(_))));
    }
}

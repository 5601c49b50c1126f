//! One export run: fetch, convert, send.

use wxm_core::{Config, Sink};
use wxm_weather::WeatherXmClient;

use crate::error::ExportError;
use crate::mysql::MySqlExporter;
use crate::source::fetch_report;
use crate::tago::TagoExporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Rows affected by the insert
    Inserted(u64),
    /// Records accepted by Tago.io
    Posted(usize),
}

impl std::fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportOutcome::Inserted(rows) => write!(f, "{} record inserted", rows),
            ExportOutcome::Posted(records) => write!(f, "{} records posted to Tago.io", records),
        }
    }
}

/// Run a single export. The first error ends the run.
pub async fn run(config: &Config, sink: Sink) -> Result<ExportOutcome, ExportError> {
    let client = WeatherXmClient::from_config(&config.weatherxm, &config.http)?;

    // Exporters are built before the fetch; the reading is only fetched
    // once there is somewhere to send it.
    match sink {
        Sink::MySql => {
            let exporter = MySqlExporter::from_config(&config.mysql, config.conversions);
            let report = fetch_report(&client, &config.weatherxm).await?;
            let rows = exporter.export(&report).await?;
            Ok(ExportOutcome::Inserted(rows))
        }
        Sink::Tago => {
            let exporter =
                TagoExporter::from_config(&config.tago, config.conversions, &config.http)?;
            let report = fetch_report(&client, &config.weatherxm).await?;
            let records = exporter.export(&report).await?;
            Ok(ExportOutcome::Posted(records))
        }
    }
}

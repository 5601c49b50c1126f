//! Exporters that forward a WeatherXM reading to MySQL or Tago.io.

pub mod error;
pub mod mysql;
pub mod pipeline;
pub mod source;
pub mod tago;

pub use error::ExportError;
pub use mysql::{InsertRow, MySqlExporter};
pub use pipeline::{run, ExportOutcome};
pub use source::{fetch_report, StationSource};
pub use tago::{build_records, is_duplicate, TagoClient, TagoExporter, TagoRecord};

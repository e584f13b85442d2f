//! CSV logging of aggregated readings.
//!
//! One row per aggregated measurement: ISO timestamp, resistance in ohms,
//! and a conductivity column only when the logger was created with geometry
//! in play. Rows are flushed as they are written so a killed monitor loop
//! loses at most the row in flight.

use chrono::{DateTime, Utc};

use crate::error::AppResult;

/// One aggregated measurement destined for the CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResistanceRecord {
    /// When the aggregated reading completed.
    pub timestamp: DateTime<Utc>,
    /// Aggregated resistance in ohms.
    pub resistance_ohm: f64,
    /// Derived conductivity, present only when geometry was supplied.
    pub conductivity_s_per_m: Option<f64>,
}

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use crate::error::DmmError;
    use log::info;
    use std::fs::File;
    use std::path::Path;

    /// Append-only CSV writer for resistance records.
    pub struct CsvLogger {
        writer: csv::Writer<File>,
        with_conductivity: bool,
    }

    impl CsvLogger {
        /// Create the file (and any missing parent directories) and write
        /// the header row.
        pub fn create(path: &Path, with_conductivity: bool) -> AppResult<Self> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let file = File::create(path)?;
            let mut writer = csv::Writer::from_writer(file);
            if with_conductivity {
                writer.write_record(["timestamp_iso", "resistance_ohm", "conductivity_s_per_m"])?;
            } else {
                writer.write_record(["timestamp_iso", "resistance_ohm"])?;
            }
            writer.flush()?;

            info!("CSV logger initialized at '{}'", path.display());
            Ok(Self {
                writer,
                with_conductivity,
            })
        }

        /// Append one record and flush it to disk.
        pub fn append(&mut self, record: &ResistanceRecord) -> AppResult<()> {
            if self.with_conductivity {
                let sigma = record.conductivity_s_per_m.ok_or_else(|| {
                    DmmError::InvalidParameter(
                        "record is missing conductivity for a conductivity-enabled log"
                            .to_string(),
                    )
                })?;
                self.writer.write_record(&[
                    record.timestamp.to_rfc3339(),
                    record.resistance_ohm.to_string(),
                    sigma.to_string(),
                ])?;
            } else {
                self.writer.write_record(&[
                    record.timestamp.to_rfc3339(),
                    record.resistance_ohm.to_string(),
                ])?;
            }
            self.writer.flush()?;
            Ok(())
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvLogger;

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use crate::error::DmmError;
    use std::path::Path;

    /// Stub logger when CSV support is compiled out.
    pub struct CsvLogger;

    impl CsvLogger {
        /// Always fails: CSV support is not compiled in.
        pub fn create(_path: &Path, _with_conductivity: bool) -> AppResult<Self> {
            Err(DmmError::FeatureNotEnabled("storage_csv".to_string()))
        }

        /// Unreachable without a constructed logger.
        pub fn append(&mut self, _record: &ResistanceRecord) -> AppResult<()> {
            Err(DmmError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvLogger;

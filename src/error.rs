//! Custom error types for the application.
//!
//! This module defines the primary error type, `DmmError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure classes of an instrument
//! session:
//!
//! - **`Config` / `Configuration`**: errors from the `figment` loader and
//!   semantic validation failures on loaded settings.
//! - **`InvalidParameter`**: a caller-supplied value (NPLC, sample count,
//!   geometry, resistance) rejected at the boundary, before any I/O.
//! - **`NoInstrumentsFound`**: auto-discovery produced an empty resource
//!   list. Fatal, never retried.
//! - **`Open` / `OpenExhausted`**: transport-level failure while opening a
//!   specific endpoint. `Open` is retried by the connection manager up to
//!   the configured bound, then wrapped into `OpenExhausted` which carries
//!   the attempt count and the last underlying cause.
//! - **`Communication`**: failure during send/query on an already-open
//!   handle (timeout, transport drop). Never retried internally; mid-sequence
//!   retry would desynchronize instrument state.
//! - **`Parse`**: a reply's first field is not a valid number. Distinct from
//!   communication failure so callers can tell data corruption from a dead
//!   link.
//! - **`EmptyAggregate`**: aggregation over zero readings.
//!
//! Close failures are not represented here at all: the session logs and
//! swallows them so they can never mask the primary error.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DmmError>;

/// Application error type covering configuration, connection, communication,
/// and measurement failures.
#[derive(Error, Debug)]
pub enum DmmError {
    /// Error from the figment configuration loader (file or env parsing).
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Semantic error in loaded settings (parsed fine, logically invalid).
    #[error("configuration validation error: {0}")]
    Configuration(String),

    /// Caller-supplied parameter rejected before any I/O was attempted.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Auto-discovery found no instrument endpoints.
    #[error("no instruments found; is the DMM7510 connected and powered on?")]
    NoInstrumentsFound,

    /// A single failed attempt to open a specific endpoint.
    #[error("failed to open instrument '{resource}': {reason}")]
    Open {
        /// Endpoint that was being opened.
        resource: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// All open attempts exhausted; wraps the last underlying failure.
    #[error("failed to open instrument after {attempts} attempts")]
    OpenExhausted {
        /// How many opens were attempted.
        attempts: u32,
        /// The final attempt's error.
        #[source]
        source: Box<DmmError>,
    },

    /// Send/query failure on an already-open handle.
    #[error("communication error: {0}")]
    Communication(String),

    /// Instrument reply whose first field did not parse as a number.
    #[error("malformed instrument reply '{reply}': {reason}")]
    Parse {
        /// The raw reply line as received (already trimmed).
        reply: String,
        /// Why parsing failed.
        reason: String,
    },

    /// Aggregation requested over an empty reading sequence.
    #[error("no readings to aggregate")]
    EmptyAggregate,

    /// I/O error outside the instrument link (CSV files, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization or write failure.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Functionality compiled out via feature flags.
    #[error("feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

//! Configuration loading for the DMM7510 interface.
//!
//! Settings are loaded with figment from two sources, later wins:
//! 1. a TOML file (default `config/default.toml`, optional)
//! 2. environment variables prefixed with `DMM_`
//!
//! Example: `DMM_TIMEOUT_MS=5000` overrides `timeout_ms` from the file.
//! All numeric bounds are validated immediately after extraction; an invalid
//! configuration never reaches the connection manager.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::adapters::TransportKind;
use crate::error::{AppResult, DmmError};
use crate::measurement::resistance::TriggerMode;

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Immutable application settings.
///
/// An empty or absent `resource` means "auto-select the first instrument the
/// transport registry can discover".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Instrument endpoint. `host:port` for the TCP transport, a VISA
    /// resource string (e.g. `USB0::0x05E6::0x7510::04647223::INSTR`) for
    /// the VISA transport.
    #[serde(default)]
    pub resource: Option<String>,

    /// Which transport family opens the link.
    #[serde(default)]
    pub transport: TransportKind,

    /// Per-call read/write timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connection open attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between failed open attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Default integration time in number of power-line cycles.
    #[serde(default = "default_nplc")]
    pub nplc: f64,

    /// Default pause between consecutive samples, in milliseconds.
    #[serde(default = "default_sample_delay_ms")]
    pub sample_delay_ms: u64,

    /// Default number of samples per aggregated reading.
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,

    /// How a single reading is triggered on the instrument.
    #[serde(default)]
    pub trigger: TriggerMode,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_nplc() -> f64 {
    10.0
}

fn default_sample_delay_ms() -> u64 {
    100
}

fn default_sample_count() -> u32 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resource: None,
            transport: TransportKind::default(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            nplc: default_nplc(),
            sample_delay_ms: default_sample_delay_ms(),
            sample_count: default_sample_count(),
            trigger: TriggerMode::default(),
        }
    }
}

impl Settings {
    /// Load settings from `config/default.toml` and `DMM_*` environment
    /// variables, then validate.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific TOML file path (file may be absent) and
    /// `DMM_*` environment variables, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DMM_"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate numeric bounds. Called by the loaders; callers constructing
    /// `Settings` by hand should call it too.
    pub fn validate(&self) -> AppResult<()> {
        if self.timeout_ms == 0 {
            return Err(DmmError::Configuration("timeout_ms must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(DmmError::Configuration("max_retries must be >= 1".into()));
        }
        if self.sample_count == 0 {
            return Err(DmmError::Configuration("sample_count must be >= 1".into()));
        }
        if !(self.nplc > 0.0) {
            return Err(DmmError::Configuration("nplc must be > 0".into()));
        }
        Ok(())
    }

    /// Explicitly configured resource, with empty strings treated as absent.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref().filter(|r| !r.is_empty())
    }

    /// Per-call transport timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause between failed open attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Pause between consecutive samples.
    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay(), Duration::from_millis(500));
        assert_eq!(settings.sample_count, 10);
        assert_eq!(settings.transport, TransportKind::Tcp);
        assert_eq!(settings.trigger, TriggerMode::Measure);
        assert!(settings.resource().is_none());
    }

    #[test]
    fn test_empty_resource_means_auto_select() {
        let settings = Settings {
            resource: Some(String::new()),
            ..Settings::default()
        };
        assert!(settings.resource().is_none());
    }

    #[test]
    fn test_validation_rejects_bad_bounds() {
        let mut settings = Settings {
            timeout_ms: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings = Settings {
            max_retries: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings = Settings {
            sample_count: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings = Settings {
            nplc: 0.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings = Settings {
            nplc: f64::NAN,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "resource = \"192.168.1.50:5025\"\ntimeout_ms = 5000\nsample_count = 4\ntrigger = \"read\""
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.resource(), Some("192.168.1.50:5025"));
        assert_eq!(settings.timeout_ms, 5000);
        assert_eq!(settings.sample_count, 4);
        assert_eq!(settings.trigger, TriggerMode::Read);
        // untouched fields keep their defaults
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = 5000").unwrap();

        std::env::set_var("DMM_TIMEOUT_MS", "2500");
        std::env::set_var("DMM_RESOURCE", "10.0.0.9:5025");
        let settings = Settings::load_from(file.path());
        std::env::remove_var("DMM_TIMEOUT_MS");
        std::env::remove_var("DMM_RESOURCE");

        let settings = settings.unwrap();
        assert_eq!(settings.timeout_ms, 2500);
        assert_eq!(settings.resource(), Some("10.0.0.9:5025"));
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_env_value() {
        std::env::set_var("DMM_SAMPLE_COUNT", "0");
        let result = Settings::load_from("does/not/exist.toml");
        std::env::remove_var("DMM_SAMPLE_COUNT");
        assert!(result.is_err());
    }
}

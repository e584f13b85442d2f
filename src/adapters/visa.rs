//! VISA transport for GPIB/USB/Ethernet instruments.
//!
//! Wraps the `visa-rs` crate behind the `instrument_visa` feature. Supports
//! resource strings like:
//! - `USB0::0x05E6::0x7510::04647223::INSTR` (USB-TMC)
//! - `TCPIP0::192.168.1.100::INSTR` (Ethernet/LXI)
//! - `GPIB0::16::INSTR` (GPIB interface)
//!
//! The registry owns the VISA resource manager for its whole lifetime, so
//! one manager is created by the top-level caller and reused across
//! sessions. Without the feature, both types exist but every operation
//! returns a feature-disabled error, keeping the configuration surface
//! uniform.

use std::time::Duration;

use super::{Transport, TransportRegistry};
use crate::error::{AppResult, DmmError};

#[cfg(feature = "instrument_visa")]
use log::debug;
#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// VISA transport for one open instrument session.
#[cfg(feature = "instrument_visa")]
pub struct VisaTransport {
    instrument: visa_rs::Instrument,
    resource: String,
    timeout: Duration,
    line_terminator: String,
}

#[cfg(feature = "instrument_visa")]
impl Transport for VisaTransport {
    fn send(&mut self, command: &str) -> AppResult<()> {
        let line = format!("{}{}", command, self.line_terminator);
        self.instrument
            .write_all(line.as_bytes())
            .map_err(|e| DmmError::Communication(format!(
                "VISA write failed on '{}': {}",
                self.resource, e
            )))?;
        debug!("sent: {}", command);
        Ok(())
    }

    fn query(&mut self, command: &str) -> AppResult<String> {
        self.send(command)?;

        let mut reply = String::new();
        let mut reader = BufReader::new(&mut self.instrument);
        reader
            .read_line(&mut reply)
            .map_err(|e| DmmError::Communication(format!(
                "VISA read failed on '{}': {}",
                self.resource, e
            )))?;

        let reply = reply.trim_end().to_string();
        debug!("query '{}' -> '{}'", command, reply);
        Ok(reply)
    }

    fn close(&mut self) -> AppResult<()> {
        // The VISA session is released when the instrument handle drops;
        // flush whatever is still buffered first.
        self.instrument
            .flush()
            .map_err(|e| DmmError::Communication(format!("VISA flush failed: {}", e)))?;
        debug!("VISA resource '{}' closed", self.resource);
        Ok(())
    }

    fn info(&self) -> String {
        format!(
            "VisaTransport({} @ {}ms timeout)",
            self.resource,
            self.timeout.as_millis()
        )
    }
}

/// Registry wrapping one VISA resource manager.
#[cfg(feature = "instrument_visa")]
pub struct VisaRegistry {
    rm: DefaultRM,
}

#[cfg(feature = "instrument_visa")]
impl VisaRegistry {
    /// Create the resource manager. Fails if no VISA library is installed.
    pub fn new() -> AppResult<Self> {
        let rm = DefaultRM::new().map_err(|e| {
            DmmError::Open {
                resource: "VISA resource manager".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { rm })
    }

    fn visa_string(resource: &str) -> AppResult<VisaString> {
        let c_string = CString::new(resource).map_err(|e| DmmError::Open {
            resource: resource.to_string(),
            reason: format!("invalid resource string: {}", e),
        })?;
        Ok(VisaString::from(c_string))
    }
}

#[cfg(feature = "instrument_visa")]
impl TransportRegistry for VisaRegistry {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        let expr = Self::visa_string("?*::INSTR")?;
        let list = self.rm.find_res_list(&expr).map_err(|e| DmmError::Open {
            resource: "?*::INSTR".to_string(),
            reason: format!("VISA enumeration failed: {}", e),
        })?;

        let mut resources = Vec::new();
        for res in list {
            match res {
                Ok(name) => resources.push(name.to_string_lossy().into_owned()),
                Err(e) => {
                    log::warn!("skipping unreadable VISA resource entry: {}", e);
                }
            }
        }
        Ok(resources)
    }

    fn open(&self, resource: &str, timeout: Duration) -> AppResult<Box<dyn Transport>> {
        let visa_string = Self::visa_string(resource)?;
        let instrument = self
            .rm
            .open(&visa_string, AccessMode::NO_LOCK, timeout)
            .map_err(|e| DmmError::Open {
                resource: resource.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource,
            timeout.as_millis()
        );

        Ok(Box::new(VisaTransport {
            instrument,
            resource: resource.to_string(),
            timeout,
            line_terminator: "\n".to_string(),
        }))
    }
}

/// Stub registry when VISA support is compiled out.
#[cfg(not(feature = "instrument_visa"))]
pub struct VisaRegistry;

#[cfg(not(feature = "instrument_visa"))]
impl VisaRegistry {
    /// Always fails: VISA support is not compiled in.
    pub fn new() -> AppResult<Self> {
        Err(DmmError::FeatureNotEnabled("instrument_visa".to_string()))
    }
}

#[cfg(not(feature = "instrument_visa"))]
impl TransportRegistry for VisaRegistry {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        Err(DmmError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    fn open(&self, _resource: &str, _timeout: Duration) -> AppResult<Box<dyn Transport>> {
        Err(DmmError::FeatureNotEnabled("instrument_visa".to_string()))
    }
}

#[cfg(all(test, not(feature = "instrument_visa")))]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_feature_is_reported() {
        let err = VisaRegistry::new().err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("feature 'instrument_visa' is not enabled. Please build with --features instrument_visa")
        );
    }
}

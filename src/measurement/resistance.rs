//! Resistance measurement primitives: configure the instrument, capture
//! readings, aggregate them.
//!
//! SCPI command strings are the fixed external contract with the DMM7510 and
//! are reproduced verbatim; do not "clean them up".

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use crate::error::{AppResult, DmmError};
use crate::session::Session;

/// How a single reading is triggered on the instrument.
///
/// `:MEAS:RES?` performs a configure + trigger + read in one command, which
/// is simpler and more robust than using `:READ?` directly; `:READ?` reuses
/// the standing configuration. Both are kept selectable because the safer
/// choice depends on the measurement setup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Combined configure-trigger-read via `:MEAS:RES?`.
    #[default]
    Measure,
    /// Trigger-and-read against the standing configuration via `:READ?`.
    Read,
}

impl TriggerMode {
    /// The query that produces one reading.
    pub fn query_command(self) -> &'static str {
        match self {
            TriggerMode::Measure => ":MEAS:RES?",
            TriggerMode::Read => ":READ?",
        }
    }
}

/// Reduction applied to a sequence of readings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Median; even-length sequences average the two middle values.
    Median,
}

impl Aggregate {
    /// Reduce a non-empty sequence of readings to one value.
    pub fn reduce(self, values: &[f64]) -> AppResult<f64> {
        if values.is_empty() {
            return Err(DmmError::EmptyAggregate);
        }
        match self {
            Aggregate::Mean => Ok(values.iter().sum::<f64>() / values.len() as f64),
            Aggregate::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    Ok(sorted[mid])
                } else {
                    Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
                }
            }
        }
    }
}

/// Configure the DMM7510 for a basic 2-wire resistance measurement.
///
/// The sequence is order-dependent: reset must precede function selection,
/// and the NPLC setting must follow it. `nplc` is validated before anything
/// is sent.
pub fn configure_2wire_resistance(session: &mut Session, nplc: f64) -> AppResult<()> {
    if !(nplc > 0.0) {
        return Err(DmmError::InvalidParameter("nplc must be > 0".to_string()));
    }
    session.send("*RST")?;
    session.send(":SENS:FUNC \"RES\"")?;
    session.send(":SENS:RES:RANG:AUTO ON")?;
    session.send(&format!(":SENS:RES:NPLC {}", nplc))?;
    session.send(":SENS:RES:AZER ON")?;
    session.send("*CLS")?;
    debug!("configured 2-wire resistance, NPLC {}", nplc);
    Ok(())
}

/// Take a single resistance measurement and return the value in ohms.
///
/// The reply is a comma-delimited line of which only the first field is the
/// resistance; a non-numeric first field is a data-integrity error, distinct
/// from a communication failure.
pub fn read_resistance_once(session: &mut Session, trigger: TriggerMode) -> AppResult<f64> {
    let reply = session.ask(trigger.query_command())?;
    let first_field = reply.split(',').next().unwrap_or("").trim();
    first_field.parse::<f64>().map_err(|e| DmmError::Parse {
        reply: reply.clone(),
        reason: e.to_string(),
    })
}

/// Take `count` resistance measurements and return the aggregated value in
/// ohms.
///
/// Readings are sequential and blocking; `delay` is inserted between
/// consecutive samples but never after the final one.
pub fn read_resistance_average(
    session: &mut Session,
    count: u32,
    delay: Duration,
    aggregate: Aggregate,
    trigger: TriggerMode,
) -> AppResult<f64> {
    if count == 0 {
        return Err(DmmError::InvalidParameter("count must be >= 1".to_string()));
    }

    let mut readings = Vec::with_capacity(count as usize);
    for i in 0..count {
        readings.push(read_resistance_once(session, trigger)?);
        if i + 1 < count && !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    aggregate.reduce(&readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CommandLog, MockRegistry};
    use crate::config::Settings;
    use crate::session::ConnectionManager;

    fn mock_session(registry: MockRegistry) -> (Session, CommandLog) {
        let log = registry.log();
        let manager = ConnectionManager::new(Box::new(registry));
        let settings = Settings {
            resource: Some("MOCK::INSTR".to_string()),
            retry_delay_ms: 0,
            ..Settings::default()
        };
        let session = manager
            .open_session(&settings)
            .expect("mock open cannot fail");
        (session, log)
    }

    #[test]
    fn test_mean_aggregation() {
        assert_eq!(Aggregate::Mean.reduce(&[1.0, 3.0]).unwrap(), 2.0);
        assert_eq!(Aggregate::Mean.reduce(&[5.0]).unwrap(), 5.0);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(Aggregate::Median.reduce(&[1.0, 10.0, 3.0]).unwrap(), 3.0);
        assert_eq!(
            Aggregate::Median.reduce(&[4.0, 1.0, 3.0, 2.0]).unwrap(),
            2.5
        );
    }

    #[test]
    fn test_empty_aggregation_is_an_error() {
        assert!(matches!(
            Aggregate::Mean.reduce(&[]),
            Err(DmmError::EmptyAggregate)
        ));
        assert!(matches!(
            Aggregate::Median.reduce(&[]),
            Err(DmmError::EmptyAggregate)
        ));
    }

    #[test]
    fn test_configure_sends_expected_commands_in_order() {
        let (mut session, log) = mock_session(MockRegistry::new());
        configure_2wire_resistance(&mut session, 5.0).unwrap();

        let commands = log.commands();
        assert_eq!(
            commands,
            vec![
                "*RST",
                ":SENS:FUNC \"RES\"",
                ":SENS:RES:RANG:AUTO ON",
                ":SENS:RES:NPLC 5",
                ":SENS:RES:AZER ON",
                "*CLS",
            ]
        );
        // function selection strictly precedes the integration-time setting
        let func = log.position_of(":SENS:FUNC \"RES\"").unwrap();
        let nplc = log.position_of(":SENS:RES:NPLC 5").unwrap();
        assert!(func < nplc);
    }

    #[test]
    fn test_configure_rejects_bad_nplc_before_io() {
        let (mut session, log) = mock_session(MockRegistry::new());
        assert!(configure_2wire_resistance(&mut session, 0.0).is_err());
        assert!(configure_2wire_resistance(&mut session, -1.0).is_err());
        assert!(configure_2wire_resistance(&mut session, f64::NAN).is_err());
        assert!(log.commands().is_empty());
    }

    #[test]
    fn test_read_once_parses_first_field() {
        let (mut session, _log) =
            mock_session(MockRegistry::new().with_responses(["+1.2345E+01,+0.0,+0.0"]));
        let ohms = read_resistance_once(&mut session, TriggerMode::Measure).unwrap();
        assert!((ohms - 12.345).abs() < 1e-9);
    }

    #[test]
    fn test_read_once_uses_configured_trigger_command() {
        let (mut session, log) =
            mock_session(MockRegistry::new().with_responses(["1.0", "2.0"]));
        read_resistance_once(&mut session, TriggerMode::Measure).unwrap();
        read_resistance_once(&mut session, TriggerMode::Read).unwrap();
        assert_eq!(log.commands(), vec![":MEAS:RES?", ":READ?"]);
    }

    #[test]
    fn test_read_once_rejects_non_numeric_reply() {
        let (mut session, _log) =
            mock_session(MockRegistry::new().with_responses(["OVERFLOW,0,0"]));
        assert!(matches!(
            read_resistance_once(&mut session, TriggerMode::Measure),
            Err(DmmError::Parse { .. })
        ));
    }

    #[test]
    fn test_average_mean_end_to_end() {
        let (mut session, _log) =
            mock_session(MockRegistry::new().with_responses(["1.0,0,0", "3.0,0,0"]));
        let result = read_resistance_average(
            &mut session,
            2,
            Duration::ZERO,
            Aggregate::Mean,
            TriggerMode::Measure,
        )
        .unwrap();
        assert_eq!(result, 2.0);
    }

    #[test]
    fn test_average_median_end_to_end() {
        let (mut session, _log) = mock_session(
            MockRegistry::new().with_responses(["1.0,0,0", "10.0,0,0", "3.0,0,0"]),
        );
        let result = read_resistance_average(
            &mut session,
            3,
            Duration::ZERO,
            Aggregate::Median,
            TriggerMode::Measure,
        )
        .unwrap();
        assert_eq!(result, 3.0);
    }

    #[test]
    fn test_average_rejects_zero_count() {
        let (mut session, log) = mock_session(MockRegistry::new());
        assert!(matches!(
            read_resistance_average(
                &mut session,
                0,
                Duration::ZERO,
                Aggregate::Mean,
                TriggerMode::Measure,
            ),
            Err(DmmError::InvalidParameter(_))
        ));
        assert!(log.commands().is_empty());
    }

    #[test]
    fn test_average_propagates_communication_error() {
        let registry = MockRegistry::new()
            .with_responses(["1.0,0,0"])
            .failing_queries_after(1);
        let (mut session, _log) = mock_session(registry);
        assert!(matches!(
            read_resistance_average(
                &mut session,
                3,
                Duration::ZERO,
                Aggregate::Mean,
                TriggerMode::Measure,
            ),
            Err(DmmError::Communication(_))
        ));
    }
}

//! Transport adapter implementations
//!
//! This module contains the low-level I/O abstraction the rest of the crate
//! depends on: a [`Transport`] is one open duplex link speaking line-oriented
//! SCPI, a [`TransportRegistry`] discovers endpoints and opens transports.
//!
//! Two real implementations are provided, selected at configuration time:
//! raw TCP sockets (always available) and VISA (behind the `instrument_visa`
//! feature). [`mock::MockRegistry`] provides a scriptable in-memory
//! implementation for tests.

pub mod mock;
pub mod tcp;
pub mod visa;

pub use mock::{CommandLog, LifecycleCounters, MockRegistry, MockTransport};
pub use tcp::{TcpRegistry, TcpTransport};
pub use visa::VisaRegistry;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppResult;

/// An open duplex channel to exactly one physical instrument.
///
/// Implementations append the required line termination on writes and strip
/// trailing whitespace/termination from replies. All calls block until the
/// transport completes or the configured timeout elapses; a timeout surfaces
/// as [`DmmError::Communication`](crate::error::DmmError::Communication),
/// never as a retry.
pub trait Transport: Send {
    /// Transmit a command expecting no reply.
    fn send(&mut self, command: &str) -> AppResult<()>;

    /// Transmit a query and return the reply with trailing whitespace
    /// stripped.
    fn query(&mut self, command: &str) -> AppResult<String>;

    /// Release the underlying link. Called exactly once by the owning
    /// session.
    fn close(&mut self) -> AppResult<()>;

    /// Human-readable description for logs.
    fn info(&self) -> String;
}

/// Discovers instrument endpoints and opens [`Transport`]s to them.
///
/// This is the explicit replacement for a process-global resource manager:
/// the top-level caller creates one registry and hands it to the connection
/// manager, preserving "create once, reuse across sessions" without hidden
/// state.
pub trait TransportRegistry: Send {
    /// Enumerate known endpoints, used when no resource is configured.
    fn list_resources(&self) -> AppResult<Vec<String>>;

    /// Open a transport to a specific endpoint, applying `timeout` to the
    /// open itself and to subsequent per-call I/O.
    fn open(&self, resource: &str, timeout: Duration) -> AppResult<Box<dyn Transport>>;
}

/// Transport family selected in configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw SCPI over a TCP socket (e.g. port 5025 on the DMM7510).
    #[default]
    Tcp,
    /// VISA resource strings via the system VISA library.
    Visa,
}

/// Build the registry for the configured transport family.
pub fn registry_for(kind: TransportKind) -> AppResult<Box<dyn TransportRegistry>> {
    match kind {
        TransportKind::Tcp => Ok(Box::new(TcpRegistry::new())),
        TransportKind::Visa => Ok(Box::new(VisaRegistry::new()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_default_is_tcp() {
        assert_eq!(TransportKind::default(), TransportKind::Tcp);
    }

    #[test]
    fn test_transport_kind_serde_roundtrip() {
        let kind: TransportKind = serde_json::from_str("\"visa\"").unwrap();
        assert_eq!(kind, TransportKind::Visa);
        assert_eq!(serde_json::to_string(&TransportKind::Tcp).unwrap(), "\"tcp\"");
    }
}

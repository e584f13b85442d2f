//! Instrument connection lifecycle.
//!
//! [`ConnectionManager`] owns a transport registry and turns settings into
//! open [`Session`]s: resolve the target endpoint (explicit resource wins,
//! otherwise first discovered), retry the open up to the configured bound,
//! and hand back a handle whose release is guaranteed.
//!
//! Session state machine: `CLOSED -> OPENING (retrying) -> OPEN -> CLOSED`.
//! `OPENING` loops at most `max_retries` times; from `OPEN`, any scope exit
//! runs the close exactly once via `Drop`. Close failures are logged and
//! swallowed so they can never mask the error that ended the scope.

use log::{debug, info, warn};
use std::thread;

use crate::adapters::{Transport, TransportRegistry};
use crate::config::Settings;
use crate::error::{AppResult, DmmError};

/// Opens sessions against one transport registry.
///
/// Create the registry once at the top level and reuse the manager across
/// sessions; the registry is the only state shared between them.
pub struct ConnectionManager {
    registry: Box<dyn TransportRegistry>,
}

impl ConnectionManager {
    /// Wrap a transport registry.
    pub fn new(registry: Box<dyn TransportRegistry>) -> Self {
        Self { registry }
    }

    /// Pick the endpoint to open: the configured resource if set, otherwise
    /// the first discovered one.
    fn resolve_resource(&self, settings: &Settings) -> AppResult<String> {
        if let Some(resource) = settings.resource() {
            debug!("opening configured resource '{}'", resource);
            return Ok(resource.to_string());
        }

        let resources = self.registry.list_resources()?;
        let first = resources.into_iter().next().ok_or(DmmError::NoInstrumentsFound)?;
        info!("resource not configured; using first available: {}", first);
        Ok(first)
    }

    /// Open a session, retrying the open up to `settings.max_retries` times
    /// with `settings.retry_delay()` between attempts.
    ///
    /// Discovery failures are not retried: a missing instrument list will
    /// not improve on the next iteration, only a flaky open might.
    pub fn open_session(&self, settings: &Settings) -> AppResult<Session> {
        settings.validate()?;
        let resource = self.resolve_resource(settings)?;

        let mut last_err: Option<DmmError> = None;
        for attempt in 1..=settings.max_retries {
            match self.registry.open(&resource, settings.timeout()) {
                Ok(transport) => {
                    info!("connected to '{}' via {}", resource, transport.info());
                    return Ok(Session::new(transport, resource));
                }
                Err(err) => {
                    warn!(
                        "instrument open failed (attempt {}/{}): {}",
                        attempt, settings.max_retries, err
                    );
                    last_err = Some(err);
                    if attempt < settings.max_retries {
                        thread::sleep(settings.retry_delay());
                    }
                }
            }
        }

        // max_retries >= 1 is validated above, so the loop ran and last_err
        // is populated.
        let source = last_err.unwrap_or_else(|| {
            DmmError::Configuration("max_retries must be >= 1".to_string())
        });
        Err(DmmError::OpenExhausted {
            attempts: settings.max_retries,
            source: Box::new(source),
        })
    }
}

/// An open instrument handle with guaranteed release.
///
/// Owns the transport exclusively for the scope of the session. Dropping the
/// session (normally or while unwinding from an error) closes the transport
/// exactly once.
pub struct Session {
    transport: Box<dyn Transport>,
    resource: String,
    released: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("resource", &self.resource)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(transport: Box<dyn Transport>, resource: String) -> Self {
        Self {
            transport,
            resource,
            released: false,
        }
    }

    /// Endpoint this session is bound to.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Send a SCPI command that does NOT expect a response.
    pub fn send(&mut self, command: &str) -> AppResult<()> {
        self.transport.send(command)
    }

    /// Send a SCPI query (command ending with `?`) and return the reply with
    /// trailing termination stripped.
    pub fn ask(&mut self, command: &str) -> AppResult<String> {
        self.transport.query(command)
    }

    /// Query the instrument identification string.
    pub fn identify(&mut self) -> AppResult<String> {
        self.ask("*IDN?")
    }

    /// Close the session explicitly. Equivalent to dropping it; provided for
    /// callers who want the close to happen at a visible point.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.transport.close() {
            Ok(()) => debug!("session to '{}' released", self.resource),
            Err(err) => warn!(
                "error while closing instrument '{}'; continuing: {}",
                self.resource, err
            ),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

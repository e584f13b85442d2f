//! Raw-socket SCPI transport.
//!
//! The DMM7510 exposes its SCPI interpreter on a plain TCP port (5025 by
//! default on LXI instruments), so no VISA layer is required for Ethernet
//! use. Commands are newline-terminated ASCII; replies are single
//! newline-terminated lines.
//!
//! Resource strings are `host:port` pairs, e.g. `192.168.1.50:5025`.

use log::debug;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Transport, TransportRegistry};
use crate::error::{AppResult, DmmError};

/// SCPI-over-TCP transport for one open socket.
pub struct TcpTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    resource: String,
    timeout: Duration,
    line_terminator: String,
}

impl TcpTransport {
    /// Connect to `host:port`, applying `timeout` to the connect and to all
    /// subsequent reads and writes.
    pub fn connect(resource: &str, timeout: Duration) -> AppResult<Self> {
        let addr = resolve(resource)?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| DmmError::Open {
            resource: resource.to_string(),
            reason: e.to_string(),
        })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        debug!(
            "TCP link to '{}' opened with {}ms timeout",
            resource,
            timeout.as_millis()
        );

        Ok(Self {
            stream,
            reader,
            resource: resource.to_string(),
            timeout,
            line_terminator: "\n".to_string(),
        })
    }

    /// Set the line terminator appended to outgoing commands.
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    fn comm_err(&self, context: &str, err: &std::io::Error) -> DmmError {
        if err.kind() == std::io::ErrorKind::WouldBlock
            || err.kind() == std::io::ErrorKind::TimedOut
        {
            DmmError::Communication(format!(
                "{} timed out after {:?} on '{}'",
                context, self.timeout, self.resource
            ))
        } else {
            DmmError::Communication(format!("{} failed on '{}': {}", context, self.resource, err))
        }
    }
}

fn resolve(resource: &str) -> AppResult<SocketAddr> {
    resource
        .to_socket_addrs()
        .map_err(|e| DmmError::Open {
            resource: resource.to_string(),
            reason: format!("invalid host:port: {}", e),
        })?
        .next()
        .ok_or_else(|| DmmError::Open {
            resource: resource.to_string(),
            reason: "no addresses resolved".to_string(),
        })
}

impl Transport for TcpTransport {
    fn send(&mut self, command: &str) -> AppResult<()> {
        let line = format!("{}{}", command, self.line_terminator);
        self.stream
            .write_all(line.as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(|e| self.comm_err("write", &e))?;
        debug!("sent: {}", command);
        Ok(())
    }

    fn query(&mut self, command: &str) -> AppResult<String> {
        self.send(command)?;

        let mut reply = String::new();
        let bytes_read = self
            .reader
            .read_line(&mut reply)
            .map_err(|e| self.comm_err("read", &e))?;
        if bytes_read == 0 {
            return Err(DmmError::Communication(format!(
                "unexpected EOF from '{}'",
                self.resource
            )));
        }

        let reply = reply.trim_end().to_string();
        debug!("query '{}' -> '{}'", command, reply);
        Ok(reply)
    }

    fn close(&mut self) -> AppResult<()> {
        self.stream
            .shutdown(Shutdown::Both)
            .map_err(|e| DmmError::Communication(format!("shutdown failed: {}", e)))?;
        debug!("TCP link to '{}' closed", self.resource);
        Ok(())
    }

    fn info(&self) -> String {
        format!(
            "TcpTransport({} @ {}ms timeout)",
            self.resource,
            self.timeout.as_millis()
        )
    }
}

/// Registry for SCPI-over-TCP endpoints.
///
/// Raw sockets have no discovery protocol, so the enumerable endpoint list
/// is whatever the caller configured up front (typically one bench
/// instrument). An empty registry plus an unset resource yields the
/// "no instruments found" discovery error.
#[derive(Default)]
pub struct TcpRegistry {
    endpoints: Vec<String>,
}

impl TcpRegistry {
    /// Create a registry with no known endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known endpoint for auto-selection.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }
}

impl TransportRegistry for TcpRegistry {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        Ok(self.endpoints.clone())
    }

    fn open(&self, resource: &str, timeout: Duration) -> AppResult<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport::connect(resource, timeout)?))
    }
}

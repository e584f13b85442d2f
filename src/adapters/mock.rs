//! Scriptable in-memory transport for tests.
//!
//! [`MockRegistry`] plays the transport layer: it can fail a configured
//! number of open attempts (exercising the retry loop), and every transport
//! it hands out shares a command log and open/close counters with the
//! registry, so tests can assert on wire traffic and lifecycle after the
//! session is gone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Transport, TransportRegistry};
use crate::error::{AppResult, DmmError};

/// Shared record of every command sent through mock transports.
#[derive(Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    fn push(&self, command: &str) {
        if let Ok(mut log) = self.0.lock() {
            log.push(command.to_string());
        }
    }

    /// Snapshot of all commands sent so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Position of the first command equal to `command`, if any.
    pub fn position_of(&self, command: &str) -> Option<usize> {
        self.commands().iter().position(|c| c == command)
    }
}

/// Cloneable view of a registry's open/close counters.
///
/// Snapshot it before boxing the registry into a connection manager; the
/// counters stay shared.
#[derive(Clone)]
pub struct LifecycleCounters {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl LifecycleCounters {
    /// Total open attempts observed, including failed ones.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Total close calls observed across all handed-out transports.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// One scripted transport handed out by [`MockRegistry`].
pub struct MockTransport {
    responses: VecDeque<String>,
    log: CommandLog,
    closes: Arc<AtomicUsize>,
    queries_before_failure: Option<usize>,
    queries_served: usize,
}

impl Transport for MockTransport {
    fn send(&mut self, command: &str) -> AppResult<()> {
        self.log.push(command);
        Ok(())
    }

    fn query(&mut self, command: &str) -> AppResult<String> {
        self.log.push(command);
        if let Some(limit) = self.queries_before_failure {
            if self.queries_served >= limit {
                return Err(DmmError::Communication(
                    "simulated transport drop".to_string(),
                ));
            }
        }
        self.queries_served += 1;
        self.responses
            .pop_front()
            .ok_or_else(|| DmmError::Communication("mock response script exhausted".to_string()))
    }

    fn close(&mut self) -> AppResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn info(&self) -> String {
        "MockTransport".to_string()
    }
}

/// Scriptable registry used by unit and integration tests.
#[derive(Default)]
pub struct MockRegistry {
    resources: Vec<String>,
    responses: Vec<String>,
    failing_opens: usize,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    queries_before_failure: Option<usize>,
    log: CommandLog,
}

impl MockRegistry {
    /// Registry with no resources, no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoints returned by discovery.
    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    /// Script the reply sequence each opened transport serves to queries.
    pub fn with_responses<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses = responses.into_iter().map(Into::into).collect();
        self
    }

    /// Make the first `count` open attempts fail.
    pub fn failing_opens(mut self, count: usize) -> Self {
        self.failing_opens = count;
        self
    }

    /// Make each transport fail with a communication error after serving
    /// `count` queries.
    pub fn failing_queries_after(mut self, count: usize) -> Self {
        self.queries_before_failure = Some(count);
        self
    }

    /// Total open attempts observed so far.
    pub fn open_attempts(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Total close calls observed so far, across all handed-out transports.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// The shared command log.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Shared open/close counters, usable after the registry is boxed away.
    pub fn counters(&self) -> LifecycleCounters {
        LifecycleCounters {
            opens: self.opens.clone(),
            closes: self.closes.clone(),
        }
    }
}

impl TransportRegistry for MockRegistry {
    fn list_resources(&self) -> AppResult<Vec<String>> {
        Ok(self.resources.clone())
    }

    fn open(&self, resource: &str, _timeout: Duration) -> AppResult<Box<dyn Transport>> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_opens {
            return Err(DmmError::Open {
                resource: resource.to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        Ok(Box::new(MockTransport {
            responses: self.responses.iter().cloned().collect(),
            log: self.log.clone(),
            closes: self.closes.clone(),
            queries_before_failure: self.queries_before_failure,
            queries_served: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_replies_in_order() {
        let registry = MockRegistry::new().with_responses(["1.0", "2.0"]);
        let mut transport = registry.open("MOCK", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.query("A?").unwrap(), "1.0");
        assert_eq!(transport.query("B?").unwrap(), "2.0");
        assert!(transport.query("C?").is_err());
        assert_eq!(registry.log().commands(), vec!["A?", "B?", "C?"]);
    }

    #[test]
    fn test_failing_opens_then_success() {
        let registry = MockRegistry::new().failing_opens(2);
        assert!(registry.open("MOCK", Duration::from_secs(1)).is_err());
        assert!(registry.open("MOCK", Duration::from_secs(1)).is_err());
        assert!(registry.open("MOCK", Duration::from_secs(1)).is_ok());
        assert_eq!(registry.open_attempts(), 3);
    }

    #[test]
    fn test_close_counting() {
        let registry = MockRegistry::new();
        let mut transport = registry.open("MOCK", Duration::from_secs(1)).unwrap();
        transport.close().unwrap();
        assert_eq!(registry.close_count(), 1);
    }
}

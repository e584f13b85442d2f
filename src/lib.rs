//! Core library for the dmm_daq application.
//!
//! Drives a Keithley DMM7510 bench multimeter over a SCPI link (raw TCP or
//! VISA), takes 2-wire resistance measurements, aggregates them, optionally
//! derives conductivity from sample geometry, and logs results. All I/O is
//! synchronous and blocking; one session owns one instrument.

pub mod adapters;
pub mod config;
pub mod error;
pub mod measurement;
pub mod session;
pub mod storage;

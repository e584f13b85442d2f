//! Measurement pipeline: instrument configuration, sampling, aggregation,
//! and derived quantities.

pub mod geometry;
pub mod resistance;

pub use geometry::{conductivity_s_per_m, Geometry};
pub use resistance::{
    configure_2wire_resistance, read_resistance_average, read_resistance_once, Aggregate,
    TriggerMode,
};

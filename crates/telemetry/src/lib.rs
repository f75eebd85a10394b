// Path: crates/telemetry/src/lib.rs
//! Metrics sinks and tracing setup for the view-call execution engine.

mod init;
mod sinks;

pub use init::init_tracing;
pub use sinks::{metrics, NopSink, ViewMetricsSink, SINK};

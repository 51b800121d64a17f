//! Internal telemetry for the firehose nozzle.
//!
//! In-process counters only; the pipeline itself is the metrics transport
//! of last resort, so nothing here talks to the network.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;

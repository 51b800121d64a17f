//! Delivery side of the pipeline: the batching sink state machine and the
//! HEC wire client it drives.

pub mod batch;
pub mod client;
pub mod config;
pub mod sink;

pub use batch::Batch;
pub use client::{EventWriter, HecClient};
pub use config::{HecConfig, SinkConfig};
pub use sink::BatchingSink;

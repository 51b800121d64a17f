//! Firehose ingestion: the v2 wire schema, the envelope adapter that
//! normalizes it to the internal envelope type, and the source contract
//! the dispatcher reads from.

pub mod adapter;
pub mod config;
pub mod convert;
pub mod gateway;
pub mod source;
pub mod wire;

pub use adapter::{EnvelopeStream, StreamEvent, Streamer, V2Adapter};
pub use config::FirehoseConfig;
pub use gateway::GatewayStreamer;
pub use source::{CloseCode, FirehoseSource, SourceError, StreamerSource};
pub use wire::{EgressBatchRequest, Selector, WireEnvelope};

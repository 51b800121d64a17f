//! Core types for the firehose nozzle.
//!
//! Holds the internal envelope model, the routed-record representation
//! handed to delivery sinks, the unified error type, and the bounded
//! drop-queue primitive shared by the routing and delivery hand-offs.

pub mod envelope;
pub mod error;
pub mod queue;
pub mod record;
pub mod sink;

pub use envelope::{parse_wanted_kinds, Envelope, EventKind, LogStream, Payload};
pub use error::{Error, Result};
pub use queue::{dropping_channel, DropCounter, DropSender};
pub use record::{EventFields, RoutedRecord};
pub use sink::Sink;

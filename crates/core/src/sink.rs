//! Destination sink contract.

use async_trait::async_trait;

use crate::record::EventFields;
use crate::Result;

/// Minimal contract a destination backend satisfies.
///
/// `write` hands over one routed event as an open field map plus a message
/// body. Implementations own batching, retries, and delivery; callers own
/// nothing past a successful enqueue.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    async fn write(&self, fields: EventFields, message: &str) -> Result<()>;
}

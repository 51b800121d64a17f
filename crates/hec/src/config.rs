//! Delivery configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// HEC endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HecConfig {
    /// Base host of the ingestion endpoint, scheme included.
    #[serde(default = "default_host")]
    pub host: String,
    /// Ingestion token sent on every request.
    #[serde(default)]
    pub token: String,
    /// Default destination index; empty omits the field.
    #[serde(default)]
    pub index: String,
    /// Static fields attached to every delivered record.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Skip TLS certificate verification towards the endpoint.
    #[serde(default)]
    pub skip_ssl_verify: bool,
    /// Write serialized payloads to stdout instead of the network.
    #[serde(default)]
    pub debug: bool,
}

fn default_host() -> String {
    "https://localhost:8088".to_string()
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            token: String::new(),
            index: String::new(),
            fields: BTreeMap::new(),
            skip_ssl_verify: false,
            debug: false,
        }
    }
}

/// Batching sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Records per batch before an early flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Longest a batch accumulates, measured from its first record.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Record intake queue capacity; a full queue rejects writes.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Completed-batch queue capacity; a full queue sheds batches.
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,
    /// Delivery worker count.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Delivery retries after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_queue_size() -> usize {
    10_000
}

fn default_delivery_queue_capacity() -> usize {
    100
}

fn default_workers() -> usize {
    8
}

fn default_retries() -> u32 {
    2
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            queue_size: default_queue_size(),
            delivery_queue_capacity: default_delivery_queue_capacity(),
            workers: default_workers(),
            retries: default_retries(),
        }
    }
}

//! Batched-streaming wire schema.
//!
//! This is the newer envelope form the gateway emits: one JSON object per
//! envelope, the kind encoded as a single-variant message field, envelopes
//! grouped into batches. The adapter converts it to the internal type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One envelope as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Wall-clock timestamp in nanoseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub message: WireMessage,
}

/// Kind-specific message body, externally tagged on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMessage {
    Log(WireLog),
    Counter(WireCounter),
    Gauge(WireGauge),
    Timer(WireTimer),
    Event(WireEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLog {
    #[serde(default)]
    pub payload: String,
    #[serde(rename = "type", default)]
    pub stream: WireLogStream,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireLogStream {
    #[default]
    Out,
    Err,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCounter {
    pub name: String,
    #[serde(default)]
    pub delta: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGauge {
    /// Named metrics carried by this gauge. Ordered so conversion fan-out
    /// is deterministic.
    #[serde(default)]
    pub metrics: BTreeMap<String, GaugeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeValue {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTimer {
    pub name: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub stop: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// A batch of wire envelopes, the unit the gateway streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeBatch {
    #[serde(default)]
    pub batch: Vec<WireEnvelope>,
}

/// Upstream envelope kinds a subscription can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Log,
    Counter,
    Event,
    Gauge,
    Timer,
}

impl Selector {
    /// Every selector; the adapter always subscribes to the full set.
    pub fn all() -> Vec<Selector> {
        vec![
            Selector::Log,
            Selector::Counter,
            Selector::Event,
            Selector::Gauge,
            Selector::Timer,
        ]
    }

    pub fn as_query_key(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Counter => "counter",
            Self::Event => "event",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
        }
    }
}

/// Subscription request sent when opening the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgressBatchRequest {
    pub shard_id: String,
    pub selectors: Vec<Selector>,
}

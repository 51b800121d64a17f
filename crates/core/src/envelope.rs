//! Internal telemetry envelope model.
//!
//! One envelope is a single telemetry record read from the firehose. It is
//! immutable after construction; enrichment downstream produces new routed
//! records rather than mutating the envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The closed set of envelope kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
}

impl EventKind {
    /// All kinds, in wire-id order.
    pub const ALL: [EventKind; 6] = [
        EventKind::HttpStartStop,
        EventKind::LogMessage,
        EventKind::ValueMetric,
        EventKind::CounterEvent,
        EventKind::Error,
        EventKind::ContainerMetric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpStartStop => "HttpStartStop",
            Self::LogMessage => "LogMessage",
            Self::ValueMetric => "ValueMetric",
            Self::CounterEvent => "CounterEvent",
            Self::Error => "Error",
            Self::ContainerMetric => "ContainerMetric",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HttpStartStop" => Ok(Self::HttpStartStop),
            "LogMessage" => Ok(Self::LogMessage),
            "ValueMetric" => Ok(Self::ValueMetric),
            "CounterEvent" => Ok(Self::CounterEvent),
            "Error" => Ok(Self::Error),
            "ContainerMetric" => Ok(Self::ContainerMetric),
            other => Err(Error::config(format!("unknown event kind: {other}"))),
        }
    }
}

/// Which output stream a log line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStream {
    Out,
    Err,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::Err => "ERR",
        }
    }
}

/// Kind-specific envelope payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Log {
        message: Bytes,
        stream: LogStream,
    },
    HttpStartStop {
        method: String,
        uri: String,
        status_code: i32,
        start: i64,
        stop: i64,
        content_length: i64,
    },
    ValueMetric {
        name: String,
        value: f64,
        unit: String,
    },
    CounterEvent {
        name: String,
        delta: u64,
        total: u64,
    },
    Error {
        source: String,
        code: i32,
        message: String,
    },
    ContainerMetric {
        instance_index: i32,
        cpu_percentage: f64,
        memory_bytes: u64,
        disk_bytes: u64,
        memory_bytes_quota: u64,
        disk_bytes_quota: u64,
    },
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Log { .. } => EventKind::LogMessage,
            Self::HttpStartStop { .. } => EventKind::HttpStartStop,
            Self::ValueMetric { .. } => EventKind::ValueMetric,
            Self::CounterEvent { .. } => EventKind::CounterEvent,
            Self::Error { .. } => EventKind::Error,
            Self::ContainerMetric { .. } => EventKind::ContainerMetric,
        }
    }
}

/// A single telemetry record emitted by a workload instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Identifier of the emitting workload.
    pub source_id: String,
    /// Instance of the workload, when the transport reports one.
    pub instance_id: Option<String>,
    /// Wall-clock timestamp in nanoseconds.
    pub timestamp: i64,
    /// Transport-level tags attached to the record.
    pub tags: BTreeMap<String, String>,
    pub payload: Payload,
}

impl Envelope {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Parses a comma-separated allow-list of kind names.
///
/// An empty input selects nothing; every name must be one of the six kinds.
pub fn parse_wanted_kinds(spec: &str) -> crate::Result<Vec<EventKind>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(EventKind::from_str)
        .collect()
}

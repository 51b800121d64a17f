//! Envelope builders shared across tests.

use std::collections::BTreeMap;

use firehose::wire::{WireLog, WireLogStream, WireMessage};
use firehose::WireEnvelope;
use nozzle_core::{Envelope, LogStream, Payload};

/// An internal log envelope from the given workload.
pub fn log_envelope(source_id: &str, payload: &str) -> Envelope {
    Envelope {
        source_id: source_id.to_string(),
        instance_id: Some("0".to_string()),
        timestamp: 1_000_000,
        tags: BTreeMap::new(),
        payload: Payload::Log {
            message: payload.as_bytes().to_vec().into(),
            stream: LogStream::Out,
        },
    }
}

/// An internal counter envelope from the given workload.
pub fn counter_envelope(source_id: &str, name: &str) -> Envelope {
    Envelope {
        source_id: source_id.to_string(),
        instance_id: None,
        timestamp: 1_000_000,
        tags: BTreeMap::new(),
        payload: Payload::CounterEvent {
            name: name.to_string(),
            delta: 1,
            total: 10,
        },
    }
}

/// A wire-form log envelope, as the gateway would stream it.
pub fn wire_log_envelope(source_id: &str, payload: &str) -> WireEnvelope {
    WireEnvelope {
        timestamp: 1_000_000,
        source_id: source_id.to_string(),
        instance_id: "0".to_string(),
        tags: BTreeMap::new(),
        message: WireMessage::Log(WireLog {
            payload: payload.to_string(),
            stream: WireLogStream::Out,
        }),
    }
}

//! Wire-to-internal envelope conversion.
//!
//! Conversion is deterministic and kind-preserving where an exact internal
//! counterpart exists; the remaining wire kinds map to their nearest
//! internal equivalent. One wire envelope may expand to zero or more
//! internal envelopes.

use bytes::Bytes;
use nozzle_core::{Envelope, LogStream, Payload};

use crate::wire::{WireEnvelope, WireGauge, WireLogStream, WireMessage};

/// Gauge metric names that together describe a container sample.
const CONTAINER_KEYS: [&str; 5] = ["cpu", "disk", "disk_quota", "memory", "memory_quota"];

/// Converts one wire envelope into internal envelopes.
///
/// A gauge fans out to one value metric per named metric, unless it carries
/// exactly the container key set, which collapses to a single container
/// metric. Timers become http start-stop records; events become error
/// records.
pub fn to_internal(wire: WireEnvelope) -> Vec<Envelope> {
    let WireEnvelope {
        timestamp,
        source_id,
        instance_id,
        tags,
        message,
    } = wire;

    let instance_id = if instance_id.is_empty() {
        None
    } else {
        Some(instance_id)
    };

    let payloads = match message {
        WireMessage::Log(log) => vec![Payload::Log {
            message: Bytes::from(log.payload.into_bytes()),
            stream: match log.stream {
                WireLogStream::Out => LogStream::Out,
                WireLogStream::Err => LogStream::Err,
            },
        }],
        WireMessage::Counter(counter) => vec![Payload::CounterEvent {
            name: counter.name,
            delta: counter.delta,
            total: counter.total,
        }],
        WireMessage::Gauge(gauge) => {
            if is_container_gauge(&gauge) {
                vec![container_payload(&gauge, instance_id.as_deref())]
            } else {
                gauge
                    .metrics
                    .into_iter()
                    .map(|(name, metric)| Payload::ValueMetric {
                        name,
                        value: metric.value,
                        unit: metric.unit,
                    })
                    .collect()
            }
        }
        WireMessage::Timer(timer) => vec![Payload::HttpStartStop {
            method: tags.get("method").cloned().unwrap_or_default(),
            uri: tags.get("uri").cloned().unwrap_or_default(),
            status_code: tag_number(&tags, "status_code") as i32,
            start: timer.start,
            stop: timer.stop,
            content_length: tag_number(&tags, "content_length"),
        }],
        WireMessage::Event(event) => vec![Payload::Error {
            source: event.title,
            code: 0,
            message: event.body,
        }],
    };

    payloads
        .into_iter()
        .map(|payload| Envelope {
            source_id: source_id.clone(),
            instance_id: instance_id.clone(),
            timestamp,
            tags: tags.clone(),
            payload,
        })
        .collect()
}

fn is_container_gauge(gauge: &WireGauge) -> bool {
    gauge.metrics.len() == CONTAINER_KEYS.len()
        && CONTAINER_KEYS.iter().all(|k| gauge.metrics.contains_key(*k))
}

fn container_payload(gauge: &WireGauge, instance_id: Option<&str>) -> Payload {
    let value = |key: &str| gauge.metrics.get(key).map(|m| m.value).unwrap_or(0.0);
    Payload::ContainerMetric {
        instance_index: instance_id.and_then(|id| id.parse().ok()).unwrap_or(0),
        cpu_percentage: value("cpu"),
        memory_bytes: value("memory") as u64,
        disk_bytes: value("disk") as u64,
        memory_bytes_quota: value("memory_quota") as u64,
        disk_bytes_quota: value("disk_quota") as u64,
    }
}

fn tag_number(tags: &std::collections::BTreeMap<String, String>, key: &str) -> i64 {
    tags.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

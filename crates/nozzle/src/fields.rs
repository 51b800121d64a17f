//! Envelope flattening into routed-record fields.
//!
//! The envelope's tagged payload is only opened up here, at the routing
//! boundary; downstream everything is an open field map plus a message
//! body.

use nozzle_core::{Envelope, EventFields, Payload};
use serde_json::json;

/// Flattens an envelope into delivery fields and a message body.
///
/// Transport tags go in first so the well-known field names below win on
/// collision.
pub fn event_fields(envelope: &Envelope) -> (EventFields, String) {
    let mut fields = EventFields::new();

    for (key, value) in &envelope.tags {
        fields.insert(key.clone(), json!(value));
    }

    fields.insert("event_kind".into(), json!(envelope.kind().as_str()));
    fields.insert("source_id".into(), json!(envelope.source_id));
    if let Some(instance_id) = &envelope.instance_id {
        fields.insert("instance_id".into(), json!(instance_id));
    }
    fields.insert("timestamp".into(), json!(envelope.timestamp));

    let mut message = String::new();
    match &envelope.payload {
        Payload::Log { message: payload, stream } => {
            fields.insert("log_stream".into(), json!(stream.as_str()));
            message = String::from_utf8_lossy(payload).into_owned();
        }
        Payload::HttpStartStop {
            method,
            uri,
            status_code,
            start,
            stop,
            content_length,
        } => {
            fields.insert("method".into(), json!(method));
            fields.insert("uri".into(), json!(uri));
            fields.insert("status_code".into(), json!(status_code));
            fields.insert("start_timestamp".into(), json!(start));
            fields.insert("stop_timestamp".into(), json!(stop));
            fields.insert("content_length".into(), json!(content_length));
        }
        Payload::ValueMetric { name, value, unit } => {
            fields.insert("name".into(), json!(name));
            fields.insert("value".into(), json!(value));
            fields.insert("unit".into(), json!(unit));
        }
        Payload::CounterEvent { name, delta, total } => {
            fields.insert("name".into(), json!(name));
            fields.insert("delta".into(), json!(delta));
            fields.insert("total".into(), json!(total));
        }
        Payload::Error { source, code, message: body } => {
            fields.insert("error_source".into(), json!(source));
            fields.insert("code".into(), json!(code));
            message = body.clone();
        }
        Payload::ContainerMetric {
            instance_index,
            cpu_percentage,
            memory_bytes,
            disk_bytes,
            memory_bytes_quota,
            disk_bytes_quota,
        } => {
            fields.insert("instance_index".into(), json!(instance_index));
            fields.insert("cpu_percentage".into(), json!(cpu_percentage));
            fields.insert("memory_bytes".into(), json!(memory_bytes));
            fields.insert("disk_bytes".into(), json!(disk_bytes));
            fields.insert("memory_bytes_quota".into(), json!(memory_bytes_quota));
            fields.insert("disk_bytes_quota".into(), json!(disk_bytes_quota));
        }
    }

    (fields, message)
}

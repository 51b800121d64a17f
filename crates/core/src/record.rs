//! Routed records, the unit the delivery side operates on.

use serde_json::{Map, Value};

/// Open field bag built from an envelope at the routing boundary.
pub type EventFields = Map<String, Value>;

/// Payload field a record may carry to steer its destination index.
pub const INDEX_OVERRIDE_FIELD: &str = "info_splunk_index";

/// An enriched, JSON-serializable record owned by the batching sink until
/// delivered or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedRecord {
    event: EventFields,
}

impl RoutedRecord {
    /// Builds a record from routed fields plus an optional message body.
    pub fn new(mut fields: EventFields, message: &str) -> Self {
        if !message.is_empty() {
            fields.insert("msg".to_string(), Value::String(message.to_string()));
        }
        Self { event: fields }
    }

    /// The event body serialized under the `"event"` key at delivery.
    pub fn event(&self) -> &EventFields {
        &self.event
    }

    /// Per-record destination index override, when the payload carries one.
    pub fn index_override(&self) -> Option<&str> {
        self.event.get(INDEX_OVERRIDE_FIELD).and_then(Value::as_str)
    }
}

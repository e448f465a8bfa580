//! A single decoded log line.

use serde_json::Value;

use crate::error::CoreError;

/// Top-level field map of a decoded line.
pub type FieldMap = serde_json::Map<String, Value>;

/// Field holding the verbatim payload that is forwarded to subscribers.
pub const RAW_FIELD: &str = "raw";

/// Field naming the event kind, e.g. `"friend-location"`.
pub const TYPE_FIELD: &str = "message.type";

/// One structured event read from the source log.
///
/// Keys are the literal dotted paths written by the log producer
/// (`"message.content.location"`), not nested objects. An `Event` is only
/// mutable inside the pipeline; [`Event::into_payload`] consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    fields: FieldMap,
}

impl Event {
    /// Decode one line. The line must be a JSON object.
    pub fn decode(line: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(line).map_err(|source| CoreError::Decode {
            context: "log line".into(),
            source,
        })?;

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(CoreError::NotAnObject("log line".into())),
        }
    }

    pub fn from_fields(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of `key`; `None` when absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set_str(&mut self, key: &str, value: String) {
        self.fields.insert(key.to_string(), Value::String(value));
    }

    pub fn event_type(&self) -> Option<&str> {
        self.get_str(TYPE_FIELD)
    }

    pub fn raw(&self) -> Option<&str> {
        self.get_str(RAW_FIELD)
    }

    /// Consume the event, yielding the forwarding payload.
    ///
    /// Returns `None` when the `raw` field is missing or not a string; such
    /// events are never forwarded.
    pub fn into_payload(mut self) -> Option<String> {
        match self.fields.remove(RAW_FIELD) {
            Some(Value::String(raw)) => Some(raw),
            _ => None,
        }
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

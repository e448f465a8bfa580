//! Unwrap / transform / rewrap of JSON documents nested inside string fields.
//!
//! Forwarded payloads carry their body as a JSON document encoded in a string
//! field, which in turn encodes another document in one of its own string
//! fields. A [`NestedPath`] names that chain of fields; [`NestedPath::apply`]
//! decodes every level, hands the innermost object to a [`ContentMutation`],
//! and re-encodes the chain bottom-up. The event is only written once every
//! level succeeded, so a failure never leaves a half-mutated payload behind.

use std::sync::Arc;

use serde_json::Value;

use crate::error::CoreError;
use crate::event::{Event, FieldMap, RAW_FIELD};

/// Field inside the raw message that holds the encoded content document.
pub const CONTENT_FIELD: &str = "content";

/// A transformation of the innermost decoded object.
pub trait ContentMutation: Send + Sync {
    fn apply(&self, content: &mut FieldMap) -> Result<(), CoreError>;
}

impl<F> ContentMutation for F
where
    F: Fn(&mut FieldMap) -> Result<(), CoreError> + Send + Sync,
{
    fn apply(&self, content: &mut FieldMap) -> Result<(), CoreError> {
        self(content)
    }
}

/// Shared handle to a mutation step, as handed out by a matching rule.
pub type Mutation = Arc<dyn ContentMutation>;

/// Chain of string fields, each holding a JSON-encoded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedPath {
    fields: Vec<String>,
}

impl NestedPath {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply `mutation` to the innermost object and write the re-encoded
    /// chain back into `event`.
    pub fn apply(&self, event: &mut Event, mutation: &dyn ContentMutation) -> Result<(), CoreError> {
        let (top, rest) = self
            .fields
            .split_first()
            .ok_or_else(|| CoreError::Config("empty nested path".into()))?;

        let encoded = match event.get(top) {
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(CoreError::NotAString(top.clone())),
            None => return Err(CoreError::MissingField(top.clone())),
        };

        let rewritten = rewrap(encoded, top, rest, mutation)?;
        event.set_str(top, rewritten);
        Ok(())
    }
}

impl Default for NestedPath {
    /// `raw` -> `content`.
    fn default() -> Self {
        Self::new([RAW_FIELD, CONTENT_FIELD])
    }
}

fn rewrap(
    encoded: &str,
    field: &str,
    rest: &[String],
    mutation: &dyn ContentMutation,
) -> Result<String, CoreError> {
    let mut object = match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(CoreError::NotAnObject(field.to_string())),
        Err(source) => {
            return Err(CoreError::Decode {
                context: field.to_string(),
                source,
            })
        }
    };

    match rest.split_first() {
        None => mutation.apply(&mut object)?,
        Some((next, rest)) => {
            let inner = match object.get(next) {
                Some(Value::String(s)) => s.as_str(),
                Some(_) => return Err(CoreError::NotAString(next.clone())),
                None => return Err(CoreError::MissingField(next.clone())),
            };
            let rewritten = rewrap(inner, next, rest, mutation)?;
            object.insert(next.clone(), Value::String(rewritten));
        }
    }

    serde_json::to_string(&object).map_err(CoreError::Encode)
}

/// Removes dotted paths (`"user.bio"`) from the content object.
///
/// Missing paths are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redaction {
    paths: Vec<String>,
}

impl Redaction {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl ContentMutation for Redaction {
    fn apply(&self, content: &mut FieldMap) -> Result<(), CoreError> {
        for path in &self.paths {
            remove_path(content, path);
        }
        Ok(())
    }
}

fn remove_path(map: &mut FieldMap, path: &str) {
    match path.split_once('.') {
        None => {
            map.shift_remove(path);
        }
        Some((head, tail)) => {
            if let Some(Value::Object(inner)) = map.get_mut(head) {
                remove_path(inner, tail);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    /// Build an event whose `raw` wraps a message whose `content` wraps `content`.
    fn wrapped_event(content: Value) -> Event {
        let message = json!({
            "type": "friend-location",
            "content": content.to_string(),
        });
        let line = json!({
            "message.type": "friend-location",
            "raw": message.to_string(),
        });
        Event::decode(&line.to_string()).unwrap()
    }

    fn unwrap_content(event: &Event) -> Value {
        let message: Value = serde_json::from_str(event.raw().unwrap()).unwrap();
        serde_json::from_str(message["content"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn redaction_rewrites_innermost_content() {
        let mut event = wrapped_event(json!({
            "location": "wrld_a:1~hidden(usr_1)",
            "user": {"id": "usr_x", "bio": "secret"},
        }));

        let redaction = Redaction::new(vec!["user.bio".into(), "worldId".into()]);
        NestedPath::default().apply(&mut event, &redaction).unwrap();

        let content = unwrap_content(&event);
        assert_eq!(content["user"]["id"], "usr_x");
        assert!(content["user"].get("bio").is_none());
        assert_eq!(content["location"], "wrld_a:1~hidden(usr_1)");
    }

    #[test]
    fn closure_mutation_is_applied() {
        let mut event = wrapped_event(json!({"location": "private"}));
        let mutation = |content: &mut FieldMap| -> Result<(), CoreError> {
            content.insert("location".into(), Value::String("redacted".into()));
            Ok(())
        };

        NestedPath::default().apply(&mut event, &mutation).unwrap();

        assert_eq!(unwrap_content(&event)["location"], "redacted");
    }

    #[test]
    fn wrapper_fields_survive_rewrap() {
        let mut event = wrapped_event(json!({"a": 1}));
        NestedPath::default()
            .apply(&mut event, &Redaction::default())
            .unwrap();

        let message: Value = serde_json::from_str(event.raw().unwrap()).unwrap();
        assert_eq!(message["type"], "friend-location");
    }

    #[test]
    fn undecodable_content_leaves_event_untouched() {
        let line = json!({
            "raw": json!({"type": "t", "content": "{broken"}).to_string(),
        });
        let mut event = Event::decode(&line.to_string()).unwrap();
        let before = event.clone();

        let result = NestedPath::default().apply(&mut event, &Redaction::default());

        assert_matches!(result, Err(CoreError::Decode { context, .. }) if context == "content");
        assert_eq!(event, before);
    }

    #[test]
    fn missing_raw_is_reported() {
        let mut event = Event::decode(r#"{"message.type":"x"}"#).unwrap();
        let result = NestedPath::default().apply(&mut event, &Redaction::default());
        assert_matches!(result, Err(CoreError::MissingField(f)) if f == "raw");
    }

    #[test]
    fn non_string_content_is_reported() {
        let line = json!({"raw": json!({"content": {"inline": true}}).to_string()});
        let mut event = Event::decode(&line.to_string()).unwrap();
        let result = NestedPath::default().apply(&mut event, &Redaction::default());
        assert_matches!(result, Err(CoreError::NotAString(f)) if f == "content");
    }

    #[test]
    fn failing_mutation_aborts() {
        let mut event = wrapped_event(json!({"a": 1}));
        let before = event.clone();
        let mutation =
            |_: &mut FieldMap| -> Result<(), CoreError> { Err(CoreError::Config("nope".into())) };

        assert!(NestedPath::default().apply(&mut event, &mutation).is_err());
        assert_eq!(event, before);
    }

    #[test]
    fn single_level_path() {
        let mut event = Event::decode(&json!({"raw": r#"{"k":"v","drop":1}"#}).to_string()).unwrap();
        let path = NestedPath::new(["raw"]);
        path.apply(&mut event, &Redaction::new(vec!["drop".into()]))
            .unwrap();
        assert_eq!(event.raw(), Some(r#"{"k":"v"}"#));
    }
}

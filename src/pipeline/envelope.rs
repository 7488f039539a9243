use serde_json::{json, Value};

use crate::constants::RAW_MESSAGE_KEY;

/// The message carried by an inbound event, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Structured(Value),
    EncodedText(String),
}

impl InboundMessage {
    /// Pull the message out of an event envelope.
    ///
    /// An object with a `message` field carries the message in that field;
    /// anything else is the message itself.
    pub fn from_event(event: Value) -> Self {
        let message = match event {
            Value::Object(mut map) if map.contains_key("message") => {
                map.remove("message").unwrap_or(Value::Null)
            }
            other => other,
        };
        match message {
            Value::String(text) => InboundMessage::EncodedText(text),
            structured => InboundMessage::Structured(structured),
        }
    }

    /// Build an event from transport bytes. Payloads that are not JSON are
    /// treated as encoded text.
    pub fn from_payload(payload: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => Self::from_event(value),
            Err(_) => InboundMessage::EncodedText(String::from_utf8_lossy(payload).into_owned()),
        }
    }

    /// Resolve into a structured value. Text that does not parse is kept as
    /// `{"raw": <text>}`.
    pub fn resolve(self) -> Value {
        match self {
            InboundMessage::Structured(value) => value,
            InboundMessage::EncodedText(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(_) => json!({ RAW_MESSAGE_KEY: text }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_structured_event() {
        let msg = InboundMessage::from_event(json!({"device_id": "dev1", "CO(GT)": 2.6}));
        assert_eq!(msg.resolve(), json!({"device_id": "dev1", "CO(GT)": 2.6}));
    }

    #[test]
    fn envelope_with_structured_message() {
        let msg = InboundMessage::from_event(json!({"message": {"device_id": "dev1"}}));
        assert_eq!(msg, InboundMessage::Structured(json!({"device_id": "dev1"})));
    }

    #[test]
    fn envelope_with_encoded_message() {
        let msg = InboundMessage::from_event(json!({"message": "{\"device_id\": \"dev2\"}"}));
        assert!(matches!(msg, InboundMessage::EncodedText(_)));
        assert_eq!(msg.resolve(), json!({"device_id": "dev2"}));
    }

    #[test]
    fn unparseable_text_is_wrapped() {
        let msg = InboundMessage::from_event(json!({"message": "not json {"}));
        assert_eq!(msg.resolve(), json!({"raw": "not json {"}));
    }

    #[test]
    fn payload_bytes() {
        let msg = InboundMessage::from_payload(br#"{"device_id":"dev1","T":13.6}"#);
        assert_eq!(msg.resolve(), json!({"device_id": "dev1", "T": 13.6}));

        let msg = InboundMessage::from_payload(b"temp=13.6");
        assert_eq!(msg.resolve(), json!({"raw": "temp=13.6"}));
    }
}

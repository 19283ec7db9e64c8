//! Classification of inbound frames.
//!
//! Peers speak one of two conventions, and both are accepted:
//!
//! - wrapped: `{"type": "utf8", "utf8Data": {"event": .., "data": ..}}` or
//!   `{"type": "binary", "binaryData": <bytes>}`
//! - bare: `{"event": .., "data": ..}`, or a raw binary frame
//!
//! Anything else is kept as [`Envelope::Raw`].

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::serialization::Decoded;

const TYPE: &str = "type";
const UTF8: &str = "utf8";
const UTF8_DATA: &str = "utf8Data";
const BINARY: &str = "binary";
const BINARY_DATA: &str = "binaryData";
const EVENT: &str = "event";
const DATA: &str = "data";

/// The decoded shape of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A named event. `data` is `None` when the field is missing or `null`.
    Text {
        /// The logical event name.
        event: String,
        /// The event payload.
        data: Option<Value>,
    },
    /// A binary payload, routed to byte subscribers regardless of name.
    Binary {
        /// The unwrapped bytes.
        payload: Bytes,
    },
    /// A frame matching neither convention.
    Raw {
        /// The deserialized value.
        value: Value,
    },
}

impl Envelope {
    /// Classify a deserialized frame.
    pub fn classify(decoded: Decoded) -> Self {
        match decoded {
            Decoded::Bytes(payload) => Self::Binary { payload },
            Decoded::Value(value) => Self::classify_value(value),
        }
    }

    /// Classify a structured value.
    pub fn classify_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::Raw { value };
        };

        let kind = object.get(TYPE).and_then(Value::as_str);
        let wrapped_text = kind == Some(UTF8) && object.contains_key(UTF8_DATA);
        let wrapped_binary = kind == Some(BINARY) && object.contains_key(BINARY_DATA);

        if wrapped_text {
            let inner = object.remove(UTF8_DATA).unwrap_or(Value::Null);
            return Self::classify_bare(unwrap_text(inner));
        }
        if wrapped_binary {
            return match object.get(BINARY_DATA).and_then(decode_bytes) {
                Some(payload) => Self::Binary { payload },
                None => Self::Raw {
                    value: Value::Object(object),
                },
            };
        }
        Self::classify_object(object)
    }

    /// The event name, for text envelopes.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Text { event, .. } => Some(event),
            _ => None,
        }
    }

    fn classify_bare(value: Value) -> Self {
        match value {
            Value::Object(object) => Self::classify_object(object),
            value => Self::Raw { value },
        }
    }

    fn classify_object(mut object: Map<String, Value>) -> Self {
        if !matches!(object.get(EVENT), Some(Value::String(_))) {
            return Self::Raw {
                value: Value::Object(object),
            };
        }
        let event = match object.remove(EVENT) {
            Some(Value::String(event)) => event,
            _ => String::new(),
        };
        let data = match object.remove(DATA) {
            None | Some(Value::Null) => None,
            Some(data) => Some(data),
        };
        Self::Text { event, data }
    }
}

/// Wrapped text may carry its event as a JSON-encoded string.
fn unwrap_text(inner: Value) -> Value {
    match inner {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(text),
        },
        other => other,
    }
}

/// Decode the forms a peer may use for binary data: an array of octets, a
/// serialized Node `Buffer`, or a string.
fn decode_bytes(value: &Value) -> Option<Bytes> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Bytes::from),
        Value::Object(object) if object.get(TYPE).and_then(Value::as_str) == Some("Buffer") => {
            object.get(DATA).and_then(decode_bytes)
        }
        Value::String(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
        _ => None,
    }
}

//! Conversion between application values and wire frames.
//!
//! Outbound values are [`Payload`]s, turned into a [`Frame`] by a
//! [`Serializer`]. Inbound frames are turned into a [`Decoded`] value by a
//! [`Deserializer`]. Both are stateless and can be replaced through
//! [`ClientConfig`](crate::ClientConfig); plain closures work too:
//!
//! ```
//! use resocket::{ClientConfig, Decoded, Frame, Payload};
//!
//! let config = ClientConfig::new("ws://localhost:9000")
//!     .serializer(|payload: Payload| match payload {
//!         Payload::Text(text) => Frame::Text(text.to_uppercase()),
//!         other => resocket::JsonCodec.serialize_payload(other),
//!     })
//!     .deserializer(|frame: Frame| match frame {
//!         Frame::Text(text) => Decoded::Value(text.into()),
//!         Frame::Binary(bytes) => Decoded::Bytes(bytes),
//!     });
//! # let _ = config;
//! ```

use bytes::Bytes;
use serde_json::Value;

use crate::transport::Frame;

/// An outbound message before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Text sent as-is.
    Text(String),
    /// Bytes sent as-is.
    Binary(Bytes),
    /// Structured data, encoded by the serializer.
    Json(Value),
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// An inbound frame after deserialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Structured data, or the raw text when the frame was not valid JSON.
    Value(Value),
    /// An unwrapped binary payload.
    Bytes(Bytes),
}

/// Turns outbound payloads into wire frames.
pub trait Serializer: Send + Sync {
    /// Serialize one payload. Must not keep state between calls.
    fn serialize(&self, payload: Payload) -> Frame;
}

/// Turns inbound wire frames into values.
pub trait Deserializer: Send + Sync {
    /// Deserialize one frame. Must not fail: undecodable input degrades to
    /// its raw form.
    fn deserialize(&self, frame: Frame) -> Decoded;
}

impl<F> Serializer for F
where
    F: Fn(Payload) -> Frame + Send + Sync,
{
    fn serialize(&self, payload: Payload) -> Frame {
        self(payload)
    }
}

impl<F> Deserializer for F
where
    F: Fn(Frame) -> Decoded + Send + Sync,
{
    fn deserialize(&self, frame: Frame) -> Decoded {
        self(frame)
    }
}

/// The default codec: JSON for structured data, pass-through for the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Default serialization. Text and bytes pass through unchanged;
    /// structured data becomes JSON text.
    pub fn serialize_payload(&self, payload: Payload) -> Frame {
        match payload {
            Payload::Text(text) => Frame::Text(text),
            Payload::Binary(data) => Frame::Binary(data),
            Payload::Json(value) => Frame::Text(value.to_string()),
        }
    }

    /// Default deserialization. Text frames are parsed as JSON, falling back
    /// to the raw text as a JSON string; binary frames stay bytes.
    pub fn deserialize_frame(&self, frame: Frame) -> Decoded {
        match frame {
            Frame::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => Decoded::Value(value),
                Err(_) => Decoded::Value(Value::String(text)),
            },
            Frame::Binary(data) => Decoded::Bytes(data),
        }
    }
}

impl Serializer for JsonCodec {
    fn serialize(&self, payload: Payload) -> Frame {
        self.serialize_payload(payload)
    }
}

impl Deserializer for JsonCodec {
    fn deserialize(&self, frame: Frame) -> Decoded {
        self.deserialize_frame(frame)
    }
}

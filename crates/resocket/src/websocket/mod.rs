//! WebSocket transport built on tokio-tungstenite.
//!
//! [`WebSocketConnector`] is the connector every [`ClientConfig`](crate::ClientConfig)
//! starts with. It supports:
//! - Plain and secure endpoints (`ws://` and `wss://`)
//! - Custom handshake headers and sub-protocol negotiation
//! - Text and binary frames
//! - Automatic ping/pong handling
//!
//! Reconnection is not handled here; the client's connection manager asks
//! for a fresh transport on every attempt.

mod connector;
mod message;

pub use connector::WebSocketConnector;

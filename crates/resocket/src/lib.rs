//! A resilient duplex messaging client over WebSocket.
//!
//! resocket wraps one persistent socket, re-establishes it after failures on
//! a bounded retry schedule, and exposes inbound traffic as named event
//! channels plus raw byte and text channels.
//!
//! - **Connection management**: connect on construction, bounded reconnection,
//!   a single terminal state after shutdown or exhausted retries
//! - **Multiplexing**: inbound `{event, data}` frames routed by name, binary
//!   payloads to every byte subscriber
//! - **Pluggable serialization**: JSON by default, replaceable per client
//! - **Pluggable transport**: tokio-tungstenite by default, any [`Connector`]
//!   can be injected
//!
//! Every subscription comes in two forms: a callback (`on`, `on_bytes`, ..)
//! and an async stream (`on_stream`, `on_bytes_stream`, ..).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use resocket::{Client, ClientConfig};
//!
//! # async fn demo() -> resocket::Result<()> {
//! let client = Client::new(
//!     ClientConfig::new("wss://chat.example.com/socket")
//!         .reconnect_interval(Duration::from_secs(1))
//!         .reconnect_attempts(5),
//! )?;
//!
//! let mut messages = client.on_stream("message");
//! client.on_close(|| println!("gave up"));
//!
//! while let Some(data) = messages.next().await {
//!     println!("message: {data}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod envelope;
mod error;
mod multiplexer;
mod serialization;
mod status;
mod transport;
pub mod websocket;

pub use client::{BytesHandler, Client, Emitter, EventHandler, Sink};
pub use config::{BinaryType, ClientConfig, ClientOptions, ReconnectConfig};
pub use connection::ConnectionState;
pub use envelope::Envelope;
pub use error::{NetworkError, Result, TransportError};
pub use multiplexer::{CLOSE_EVENT, ERROR_EVENT, SubscriptionId};
pub use serialization::{Decoded, Deserializer, JsonCodec, Payload, Serializer};
pub use transport::{CloseReason, ConnectRequest, Connector, Frame, Transport, TransportEvent, TransportEvents};

pub use resocket_core::EventStream;

//! The client façade.

use std::sync::Arc;

use bytes::Bytes;
use resocket_core::EventStream;
use resocket_core::logging::targets;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::envelope::Envelope;
use crate::error::{Result, TransportError};
use crate::multiplexer::{Multiplexer, SubscriptionId};
use crate::serialization::Payload;

/// Boxed handler for text events.
pub type EventHandler = Box<dyn Fn(&Value) + Send + Sync>;
/// Boxed handler for binary payloads.
pub type BytesHandler = Box<dyn Fn(&Bytes) + Send + Sync>;

/// The sending half of a client.
pub trait Sink {
    /// Serialize and send one payload.
    fn send(&self, payload: Payload) -> Result<()>;

    /// Send `{"event": event, "data": data}`.
    fn emit_value(&self, event: &str, data: Value) -> Result<()>;
}

/// The receiving half of a client.
pub trait Emitter {
    /// Register a handler for a text event.
    fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId;

    /// Remove a handler registered with [`on`](Self::on).
    fn off(&self, event: &str, id: SubscriptionId) -> bool;

    /// Register a handler for binary payloads.
    fn on_bytes(&self, handler: BytesHandler) -> SubscriptionId;
}

/// A resilient duplex messaging client.
///
/// The client connects on construction and reconnects on its own after an
/// unexpected close, retrying every `reconnect.interval` up to
/// `reconnect.max_attempts` times. When retries are exhausted or
/// [`shutdown`](Self::shutdown) is called it enters a terminal state: every
/// stream it handed out ends, close subscribers fire once, and sends fail with
/// [`NetworkError::NotConnected`](crate::NetworkError::NotConnected).
///
/// Inbound text frames shaped `{"event": .., "data": ..}` (bare, or wrapped as
/// `{"type": "utf8", "utf8Data": ..}`) are routed by event name. Binary
/// payloads go to every byte subscriber.
///
/// Dropping the client shuts it down.
///
/// # Example
///
/// ```no_run
/// use resocket::Client;
///
/// # async fn demo() -> resocket::Result<()> {
/// let client = Client::new("ws://localhost:9000")?;
///
/// client.on("chat", |data| println!("chat: {data}"));
/// client.on_bytes(|bytes| println!("{} bytes", bytes.len()));
///
/// let mut status = client.connection_status();
/// while let Some(connected) = status.next().await {
///     if connected {
///         client.emit("join", &"lobby")?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    manager: Arc<ConnectionManager>,
    mux: Arc<Multiplexer>,
}

impl Client {
    /// Create a client and start connecting.
    ///
    /// Must be called from within a tokio runtime. Fails if the URL is not a
    /// valid `ws://`/`wss://` URL, a header is malformed, or no runtime is
    /// available.
    pub fn new(config: impl Into<ClientConfig>) -> Result<Self> {
        let config = config.into();
        let mux = Arc::new(Multiplexer::new());
        let manager = ConnectionManager::start(config, mux.clone())?;
        tracing::debug!(target: targets::CLIENT, url = %manager.url(), "client created");
        Ok(Self { manager, mux })
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get the URL this client connects to.
    pub fn url(&self) -> &str {
        self.manager.url()
    }

    /// Consecutive failed reconnection attempts since the last open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.manager.reconnect_attempt()
    }

    /// Serialize `payload` and send it.
    ///
    /// Fails with `NotConnected` if no transport is open (before the first
    /// open, mid-reconnect, or after shutdown). Nothing is queued for later.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        self.manager.send(payload.into())
    }

    /// Send any serializable value as structured data.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(Payload::Json(serde_json::to_value(value)?))
    }

    /// Send `{"event": event, "data": data}`.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> Result<()> {
        self.send(event_payload(event, serde_json::to_value(data)?))
    }

    /// Register a handler for `event`. It receives the event's `data`.
    ///
    /// `"close"` and `"error"` are reserved: the handler then receives `null`
    /// on the terminal close, or each transport error's message.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.mux.on(event, handler)
    }

    /// Register a handler receiving `data` decoded as `T`. Payloads that do
    /// not decode as `T` are skipped.
    pub fn on_typed<T, F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.mux.on_typed(event, handler)
    }

    /// Remove a handler registered for `event`.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        self.mux.off(event, id)
    }

    /// A stream of `data` values for `event`. Ends on the terminal close.
    pub fn on_stream(&self, event: &str) -> EventStream<Value> {
        self.mux.stream(event)
    }

    /// Register a handler for binary payloads.
    pub fn on_bytes<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.mux.on_bytes(handler)
    }

    /// Remove a binary payload handler.
    pub fn off_bytes(&self, id: SubscriptionId) -> bool {
        self.mux.off_bytes(id)
    }

    /// A stream of binary payloads. Ends on the terminal close.
    pub fn on_bytes_stream(&self) -> EventStream<Bytes> {
        self.mux.bytes_stream()
    }

    /// Register a handler for frames that are neither events nor binary.
    pub fn on_raw<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.mux.on_raw(handler)
    }

    /// Remove a raw frame handler.
    pub fn off_raw(&self, id: SubscriptionId) -> bool {
        self.mux.off_raw(id)
    }

    /// A stream of frames that are neither events nor binary.
    pub fn on_raw_stream(&self) -> EventStream<Value> {
        self.mux.raw_stream()
    }

    /// Every inbound envelope, before routing.
    pub fn messages(&self) -> EventStream<Envelope> {
        self.mux.envelope_stream()
    }

    /// Register a handler for the terminal close. Runs at once if the client
    /// is already closed.
    pub fn on_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.mux.on_close(handler)
    }

    /// Yields once on the terminal close, then ends.
    pub fn on_close_stream(&self) -> EventStream<()> {
        self.mux.close_stream()
    }

    /// Register a handler for transport errors.
    pub fn on_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.mux.on_error(handler)
    }

    /// Every transport error. Ends on the terminal close.
    pub fn on_error_stream(&self) -> EventStream<TransportError> {
        self.mux.error_stream()
    }

    /// Register a handler for connection status transitions.
    pub fn on_status_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.manager.status().on_change(handler)
    }

    /// Remove a status handler.
    pub fn off_status_change(&self, id: SubscriptionId) -> bool {
        self.manager.status().disconnect(id)
    }

    /// Connection status transitions from now on; never two equal values in a
    /// row. Ends on the terminal close.
    pub fn connection_status(&self) -> EventStream<bool> {
        self.manager.status().stream()
    }

    /// The last reported connection status, if any was reported yet.
    pub fn last_status(&self) -> Option<bool> {
        self.manager.status().current()
    }

    /// Close the connection and stop reconnecting. Idempotent.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

fn event_payload(event: &str, data: Value) -> Payload {
    let mut object = serde_json::Map::with_capacity(2);
    object.insert("event".to_owned(), Value::String(event.to_owned()));
    object.insert("data".to_owned(), data);
    Payload::Json(Value::Object(object))
}

impl Sink for Client {
    fn send(&self, payload: Payload) -> Result<()> {
        Client::send(self, payload)
    }

    fn emit_value(&self, event: &str, data: Value) -> Result<()> {
        Client::send(self, event_payload(event, data))
    }
}

impl Emitter for Client {
    fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        self.mux.on(event, handler)
    }

    fn off(&self, event: &str, id: SubscriptionId) -> bool {
        self.mux.off(event, id)
    }

    fn on_bytes(&self, handler: BytesHandler) -> SubscriptionId {
        self.mux.on_bytes(handler)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url())
            .field("state", &self.state())
            .field("reconnect_attempt", &self.reconnect_attempt())
            .finish()
    }
}

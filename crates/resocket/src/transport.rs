//! The seam between the connection manager and a concrete socket.
//!
//! A [`Connector`] builds one [`Transport`] per connection attempt. The
//! transport reports its lifecycle through the [`TransportEvents`] it was
//! handed; every event is tagged with the attempt's generation so the manager
//! can ignore events from transports it has already detached.
//!
//! [`WebSocketConnector`](crate::websocket::WebSocketConnector) is the default
//! implementation. Tests and alternative runtimes supply their own through
//! [`ClientConfig::connector`](crate::ClientConfig::connector).

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use crate::config::BinaryType;
use crate::error::{Result, TransportError};

/// A single wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Whether this is a text frame.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// The close status code (RFC 6455 numbering).
    pub code: u16,
    /// Optional human-readable reason string.
    pub reason: Option<String>,
}

impl CloseReason {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// The endpoint is going away.
    pub const AWAY: u16 = 1001;
    /// Closed without a close frame.
    pub const ABNORMAL: u16 = 1006;

    /// Create a close reason with just a code.
    pub fn new(code: u16) -> Self {
        Self { code, reason: None }
    }

    /// Create a close reason with a code and message.
    pub fn with_reason(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    /// A normal close.
    pub fn normal() -> Self {
        Self::new(Self::NORMAL)
    }

    /// A close without a close handshake (refused, reset, dropped).
    pub fn abnormal() -> Self {
        Self::new(Self::ABNORMAL)
    }

    /// Whether the code signals a clean close.
    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.code, reason),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Everything a connector needs to open one transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    /// The endpoint, already validated as `ws://` or `wss://`.
    pub url: Url,
    /// Sub-protocols offered during the handshake, in preference order.
    pub protocols: Vec<String>,
    /// Extra handshake headers.
    pub headers: HashMap<String, String>,
    /// How the peer's binary payloads should be surfaced.
    pub binary_type: BinaryType,
}

/// One lifecycle event reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The handshake completed.
    Open,
    /// A frame arrived.
    Message(Frame),
    /// Something went wrong. A `Close` follows if the transport is done.
    Error(TransportError),
    /// The transport is finished and will report nothing further.
    Close(Option<CloseReason>),
}

/// The sink a transport reports its lifecycle into.
///
/// Cheap to clone. Reporting never fails: once the owning client is gone the
/// events are discarded.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    sender: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, sender: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, sender }
    }

    /// The connection attempt these events belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the receiving side is still listening.
    pub fn is_attached(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Report a completed handshake.
    pub fn open(&self) {
        self.report(TransportEvent::Open);
    }

    /// Report an inbound frame.
    pub fn message(&self, frame: Frame) {
        self.report(TransportEvent::Message(frame));
    }

    /// Report a failure.
    pub fn error(&self, error: TransportError) {
        self.report(TransportEvent::Error(error));
    }

    /// Report that the transport is finished.
    pub fn close(&self, reason: Option<CloseReason>) {
        self.report(TransportEvent::Close(reason));
    }

    fn report(&self, event: TransportEvent) {
        let _ = self.sender.send((self.generation, event));
    }
}

/// A live (or connecting) socket owned by the connection manager.
///
/// Dropping the handle detaches it: the underlying socket is shut down and any
/// events it still reports are ignored.
pub trait Transport: Send + Sync {
    /// Queue a frame for sending.
    ///
    /// Fails with [`NetworkError::NotConnected`](crate::NetworkError::NotConnected)
    /// if the socket is not able to accept frames.
    fn send(&self, frame: Frame) -> Result<()>;

    /// Begin closing the socket. Idempotent.
    fn close(&self, reason: Option<CloseReason>);
}

/// Builds transports. One call per connection attempt.
pub trait Connector: Send + Sync {
    /// Start connecting. Must not block and must not fail synchronously:
    /// failures are reported as an `error` event followed by `close`.
    fn connect(&self, request: &ConnectRequest, events: TransportEvents) -> Box<dyn Transport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_helpers() {
        assert!(CloseReason::normal().is_normal());
        assert_eq!(CloseReason::abnormal().code, 1006);
        assert_eq!(CloseReason::with_reason(4000, "kicked").to_string(), "4000 (kicked)");
        assert_eq!(CloseReason::new(1001).to_string(), "1001");
    }

    #[test]
    fn test_events_are_tagged_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new(7, tx);
        events.open();
        events.message(Frame::Text("hi".into()));
        events.close(None);

        assert_eq!(rx.try_recv().unwrap(), (7, TransportEvent::Open));
        assert_eq!(
            rx.try_recv().unwrap(),
            (7, TransportEvent::Message(Frame::Text("hi".into())))
        );
        assert_eq!(rx.try_recv().unwrap(), (7, TransportEvent::Close(None)));
    }

    #[test]
    fn test_reporting_after_receiver_dropped_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new(1, tx);
        drop(rx);
        assert!(!events.is_attached());
        events.error(TransportError::new("late"));
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Frame::Text("abc".into()).len(), 3);
        assert!(Frame::Binary(Bytes::new()).is_empty());
        assert!(Frame::Text(String::new()).is_text());
    }
}

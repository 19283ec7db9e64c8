//! Error types for the client.

use std::fmt;

/// Errors returned synchronously to callers.
///
/// Failures inside the transport never surface here; they are delivered as
/// [`TransportError`] values through the client's error channels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// No open transport; the payload was not sent.
    #[error("Not connected")]
    NotConnected,
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// The client was created outside of a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for NetworkError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for NetworkError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// A connection-level failure reported by a transport.
///
/// Delivered through [`Client::on_error`](crate::Client::on_error) and
/// [`Client::on_error_stream`](crate::Client::on_error_stream); never returned
/// from an API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Human-readable error message.
    pub message: String,
    /// Whether a reconnect may succeed.
    pub recoverable: bool,
}

impl TransportError {
    /// A failure after which reconnecting may help.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: true,
        }
    }

    /// A failure reconnecting will not fix (for example a malformed request).
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<NetworkError> for TransportError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::InvalidUrl(_) | NetworkError::InvalidHeader(_) => Self::fatal(err.to_string()),
            other => Self::new(other.to_string()),
        }
    }
}

//! Client configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NetworkError, Result};
use crate::serialization::{Deserializer, JsonCodec, Serializer};
use crate::transport::{ConnectRequest, Connector};
use crate::websocket::WebSocketConnector;

/// How binary payloads from the peer are expected to be surfaced.
///
/// A hint handed to the [`Connector`]; the default WebSocket connector
/// delivers binary frames as bytes regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    /// Opaque blobs.
    #[default]
    Blob,
    /// Contiguous byte buffers.
    ArrayBuffer,
}

/// Configuration for automatic reconnection.
///
/// After an unexpected close the client retries once per `interval`, giving up
/// after `max_attempts` consecutive failures. `max_attempts == 0` disables
/// reconnection: the first close is terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay between reconnection attempts.
    pub interval: Duration,
    /// Consecutive failed attempts before the client closes for good.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Set the delay between reconnection attempts.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum number of reconnection attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Whether any reconnection will be attempted.
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

/// Configuration for a [`Client`](crate::Client).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use resocket::ClientConfig;
///
/// let config = ClientConfig::new("wss://chat.example.com/socket")
///     .protocol("chat.v2")
///     .header("Authorization", "Bearer token")
///     .reconnect_interval(Duration::from_secs(2))
///     .reconnect_attempts(5);
/// assert_eq!(config.reconnect.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// The endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Sub-protocols offered during the handshake.
    pub protocols: Vec<String>,
    /// Binary payload hint passed to the connector.
    pub binary_type: BinaryType,
    /// Custom headers to send during the handshake.
    pub headers: HashMap<String, String>,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) deserializer: Arc<dyn Deserializer>,
}

impl ClientConfig {
    /// Create a configuration for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            binary_type: BinaryType::default(),
            headers: HashMap::new(),
            reconnect: ReconnectConfig::default(),
            connector: Arc::new(WebSocketConnector::new()),
            serializer: Arc::new(JsonCodec),
            deserializer: Arc::new(JsonCodec),
        }
    }

    /// Offer a sub-protocol during the handshake.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Offer several sub-protocols, in preference order.
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols.extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Set the binary payload hint.
    pub fn binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = binary_type;
        self
    }

    /// Add a custom header for the handshake.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add multiple headers.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the delay between reconnection attempts.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect.interval = interval;
        self
    }

    /// Set the maximum number of reconnection attempts. Zero disables
    /// reconnection.
    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Replace the whole reconnection policy.
    pub fn reconnect_config(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Use a different transport implementation.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Use a different outbound serializer.
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Use a different inbound deserializer.
    pub fn deserializer(mut self, deserializer: impl Deserializer + 'static) -> Self {
        self.deserializer = Arc::new(deserializer);
        self
    }

    /// Validate the configuration and build the request every connection
    /// attempt reuses.
    pub(crate) fn connect_request(&self) -> Result<ConnectRequest> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(NetworkError::InvalidUrl(format!(
                    "unsupported scheme `{other}`, expected ws or wss"
                )));
            }
        }
        for (name, value) in &self.headers {
            http::header::HeaderName::try_from(name.as_str())?;
            http::header::HeaderValue::try_from(value.as_str())?;
        }
        for protocol in &self.protocols {
            http::header::HeaderValue::try_from(protocol.as_str())?;
        }
        Ok(ConnectRequest {
            url,
            protocols: self.protocols.clone(),
            headers: self.headers.clone(),
            binary_type: self.binary_type,
        })
    }
}

impl From<&str> for ClientConfig {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ClientConfig {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("protocols", &self.protocols)
            .field("binary_type", &self.binary_type)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

/// Plain-data client settings, loadable from JSON or any other serde format.
///
/// ```
/// use resocket::{ClientConfig, ClientOptions};
///
/// let options: ClientOptions = serde_json::from_str(
///     r#"{ "url": "ws://localhost:9000", "reconnect_attempts": 3 }"#,
/// ).unwrap();
/// let config = ClientConfig::from(options);
/// assert_eq!(config.reconnect.max_attempts, 3);
/// assert_eq!(config.reconnect.interval.as_millis(), 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// The endpoint URL.
    pub url: String,

    /// Sub-protocols offered during the handshake.
    #[serde(default)]
    pub protocols: Vec<String>,

    /// Binary payload hint ("blob" or "arraybuffer").
    #[serde(default)]
    pub binary_type: BinaryType,

    /// Delay in milliseconds between reconnection attempts.
    /// Default: 5000ms
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Consecutive failed attempts before giving up.
    /// Default: 10. Set to 0 to disable reconnection entirely.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Custom handshake headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_reconnect_interval_ms() -> u64 {
    5000
}

fn default_reconnect_attempts() -> u32 {
    10
}

impl ClientOptions {
    /// Options for `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            binary_type: BinaryType::default(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            headers: HashMap::new(),
        }
    }
}

impl From<ClientOptions> for ClientConfig {
    fn from(options: ClientOptions) -> Self {
        ClientConfig::new(options.url)
            .protocols(options.protocols)
            .binary_type(options.binary_type)
            .headers(options.headers)
            .reconnect_interval(Duration::from_millis(options.reconnect_interval_ms))
            .reconnect_attempts(options.reconnect_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("ws://localhost:9000");
        assert_eq!(config.reconnect.interval, Duration::from_millis(5000));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.binary_type, BinaryType::Blob);
        assert!(config.protocols.is_empty());
    }

    #[test]
    fn test_connect_request_validates_scheme() {
        let err = ClientConfig::new("http://localhost:9000")
            .connect_request()
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl(_)));

        let err = ClientConfig::new("not a url").connect_request().unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl(_)));

        let request = ClientConfig::new("wss://example.com/socket")
            .protocol("chat")
            .header("X-Token", "abc")
            .connect_request()
            .unwrap();
        assert_eq!(request.url.scheme(), "wss");
        assert_eq!(request.protocols, vec!["chat".to_string()]);
        assert_eq!(request.headers.get("X-Token").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_connect_request_validates_headers() {
        let err = ClientConfig::new("ws://localhost")
            .header("bad header", "x")
            .connect_request()
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidHeader(_)));

        let err = ClientConfig::new("ws://localhost")
            .header("X-Ok", "line\nbreak")
            .connect_request()
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidHeader(_)));
    }

    #[test]
    fn test_options_fill_defaults() {
        let options: ClientOptions =
            serde_json::from_str(r#"{"url":"ws://a","binary_type":"arraybuffer"}"#).unwrap();
        assert_eq!(options.reconnect_interval_ms, 5000);
        assert_eq!(options.reconnect_attempts, 10);
        assert_eq!(options.binary_type, BinaryType::ArrayBuffer);

        let config = ClientConfig::from(ClientOptions {
            reconnect_attempts: 0,
            ..options
        });
        assert!(!config.reconnect.is_enabled());
        assert_eq!(config.binary_type, BinaryType::ArrayBuffer);
    }

    #[test]
    fn test_reconnect_builder() {
        let reconnect = ReconnectConfig::new()
            .interval(Duration::from_millis(1))
            .max_attempts(3);
        assert_eq!(reconnect.interval, Duration::from_millis(1));
        assert!(reconnect.is_enabled());
        assert!(!ReconnectConfig::disabled().is_enabled());
    }
}

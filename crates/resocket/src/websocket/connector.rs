//! The default transport: one tokio-tungstenite client task per connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use resocket_core::logging::{targets, transport_span};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::Instrument;

use super::message::{from_close_frame, from_message, to_close_frame, to_message};
use crate::error::{NetworkError, Result, TransportError};
use crate::transport::{CloseReason, ConnectRequest, Connector, Frame, Transport, TransportEvents};

const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";

/// Command sent to the socket task.
enum Command {
    Send(Frame),
    Close(Option<CloseReason>),
}

/// Connects over WebSocket using tokio-tungstenite.
///
/// `wss://` endpoints are verified against the platform's native roots.
/// Ping/pong is answered by tungstenite and never surfaces as a frame.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    _private: (),
}

impl WebSocketConnector {
    /// Create the default connector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, request: &ConnectRequest, events: TransportEvents) -> Box<dyn Transport> {
        let (commands, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let transport = Box::new(WebSocketTransport {
            commands,
            open: open.clone(),
        });

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                events.error(NetworkError::NoRuntime(e.to_string()).into());
                events.close(Some(CloseReason::abnormal()));
                return transport;
            }
        };

        let span = transport_span(request.url.as_str(), events.generation());
        handle.spawn(run(request.clone(), events, rx, open).instrument(span));
        transport
    }
}

/// Handle to a socket task. Dropping it closes the socket.
struct WebSocketTransport {
    commands: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(NetworkError::NotConnected);
        }
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| NetworkError::NotConnected)
    }

    fn close(&self, reason: Option<CloseReason>) {
        let _ = self.commands.send(Command::Close(reason));
    }
}

async fn run(
    request: ConnectRequest,
    events: TransportEvents,
    mut commands: mpsc::UnboundedReceiver<Command>,
    open: Arc<AtomicBool>,
) {
    let ws_request = match build_request(&request) {
        Ok(ws_request) => ws_request,
        Err(e) => {
            events.error(e.into());
            events.close(Some(CloseReason::abnormal()));
            return;
        }
    };

    tracing::debug!(
        target: targets::TRANSPORT,
        binary_type = ?request.binary_type,
        protocols = ?request.protocols,
        "connecting"
    );

    let connecting = tokio_tungstenite::connect_async(ws_request);
    tokio::pin!(connecting);

    // Until the handshake completes a close (or a dropped handle) abandons it.
    let stream = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    tracing::warn!(target: targets::TRANSPORT, error = %e, "connection failed");
                    events.error(TransportError::new(e.to_string()));
                    events.close(Some(CloseReason::abnormal()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send(_)) => {}
                Some(Command::Close(reason)) => {
                    tracing::debug!(target: targets::TRANSPORT, "closed before handshake completed");
                    events.close(reason.or_else(|| Some(CloseReason::normal())));
                    return;
                }
                None => {
                    events.close(Some(CloseReason::normal()));
                    return;
                }
            },
        }
    };

    open.store(true, Ordering::SeqCst);
    tracing::debug!(target: targets::TRANSPORT, "open");
    events.open();

    let (mut write, mut read) = stream.split();
    let close_reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = write.send(to_message(frame)).await {
                        tracing::warn!(target: targets::TRANSPORT, error = %e, "send failed");
                        events.error(TransportError::new(e.to_string()));
                        break CloseReason::abnormal();
                    }
                }
                Some(Command::Close(reason)) => {
                    let reason = reason.unwrap_or_else(CloseReason::normal);
                    let _ = write.send(Message::Close(Some(to_close_frame(&reason)))).await;
                    break reason;
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break CloseReason::normal();
                }
            },

            message = read.next() => match message {
                Some(Ok(Message::Close(frame))) => break from_close_frame(frame),
                Some(Ok(message)) => {
                    if let Some(frame) = from_message(message) {
                        events.message(frame);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(target: targets::TRANSPORT, error = %e, "read failed");
                    events.error(TransportError::new(e.to_string()));
                    break CloseReason::abnormal();
                }
                None => break CloseReason::abnormal(),
            },
        }
    };

    open.store(false, Ordering::SeqCst);
    tracing::debug!(target: targets::TRANSPORT, code = close_reason.code, "closed");
    events.close(Some(close_reason));
}

/// Build the handshake request with custom headers and sub-protocols.
fn build_request(request: &ConnectRequest) -> Result<Request> {
    let mut ws_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| NetworkError::WebSocket(e.to_string()))?;

    let headers = ws_request.headers_mut();
    for (name, value) in &request.headers {
        let header_name = http::header::HeaderName::try_from(name.as_str())?;
        let header_value = http::header::HeaderValue::try_from(value.as_str())?;
        headers.insert(header_name, header_value);
    }
    if !request.protocols.is_empty() {
        let protocols = http::header::HeaderValue::try_from(request.protocols.join(", "))?;
        headers.insert(SEC_WEBSOCKET_PROTOCOL, protocols);
    }

    Ok(ws_request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinaryType;
    use std::collections::HashMap;
    use url::Url;

    fn request(url: &str) -> ConnectRequest {
        ConnectRequest {
            url: Url::parse(url).unwrap(),
            protocols: vec!["chat".into(), "superchat".into()],
            headers: HashMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
            binary_type: BinaryType::default(),
        }
    }

    #[test]
    fn test_build_request_sets_headers_and_protocols() {
        let ws_request = build_request(&request("ws://localhost:9000/socket")).unwrap();
        let headers = ws_request.headers();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
        assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap(), "chat, superchat");
        assert_eq!(ws_request.uri().path(), "/socket");
    }

    #[test]
    fn test_send_before_open_is_rejected() {
        let (commands, _rx) = mpsc::unbounded_channel();
        let transport = WebSocketTransport {
            commands,
            open: Arc::new(AtomicBool::new(false)),
        };
        assert_eq!(
            transport.send(Frame::Text("early".into())),
            Err(NetworkError::NotConnected)
        );
    }
}

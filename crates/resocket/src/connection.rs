//! Connection lifecycle and bounded reconnection.
//!
//! The manager owns the single live transport. Transports report into one
//! channel; a background task drains it together with the reconnection timer,
//! so lifecycle events and ticks are handled one at a time. Every handler and
//! [`ConnectionManager::shutdown`] run under one reentrant lock, which keeps
//! "at most one live transport" and "at most one reconnection loop" true even
//! when a subscriber calls back into the client from a handler.
//!
//! ```text
//! Idle -> Connecting -> Connected -> Reconnecting -> Connected
//!                                          \
//!                                           -> Closed (terminal)
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use resocket_core::logging::{connection_span, targets};
use tokio::sync::{Notify, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::envelope::Envelope;
use crate::error::{NetworkError, Result, TransportError};
use crate::multiplexer::Multiplexer;
use crate::serialization::Payload;
use crate::status::ConnectionStatusTracker;
use crate::transport::{CloseReason, ConnectRequest, Frame, Transport, TransportEvent, TransportEvents};

/// Current state of a client's connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created, no connection attempted yet.
    #[default]
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and ready to send/receive messages.
    Connected,
    /// Connection lost, retrying on the reconnection interval.
    Reconnecting,
    /// Terminal. Reached after shutdown or exhausted retries.
    Closed,
}

impl ConnectionState {
    /// Whether the state is terminal.
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

/// What the event loop should do after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Continue,
    StartTimer,
    StopTimer,
    Terminate,
}

struct Link {
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    /// Tag of the live transport's events. Bumped whenever a transport is
    /// created or detached, so events from older transports are ignored.
    generation: u64,
    /// Consecutive failed reconnection attempts.
    attempts: u32,
    /// Whether the reconnection timer is running.
    reconnecting: bool,
}

pub(crate) struct ConnectionManager {
    config: ClientConfig,
    request: ConnectRequest,
    serial: ReentrantMutex<()>,
    link: Mutex<Link>,
    status: ConnectionStatusTracker,
    mux: Arc<Multiplexer>,
    events: mpsc::UnboundedSender<(u64, TransportEvent)>,
    stop: Notify,
}

impl ConnectionManager {
    /// Validate `config`, open the first transport and spawn the event loop on
    /// the current tokio runtime.
    pub(crate) fn start(config: ClientConfig, mux: Arc<Multiplexer>) -> Result<Arc<Self>> {
        let request = config.connect_request()?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| NetworkError::NoRuntime(e.to_string()))?;

        let (events, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            config,
            request,
            serial: ReentrantMutex::new(()),
            link: Mutex::new(Link {
                state: ConnectionState::Idle,
                transport: None,
                generation: 0,
                attempts: 0,
                reconnecting: false,
            }),
            status: ConnectionStatusTracker::new(),
            mux,
            events,
            stop: Notify::new(),
        });

        let span = connection_span(&manager.config.url);
        span.in_scope(|| manager.connect());
        handle.spawn(manager.clone().run(rx).instrument(span));
        Ok(manager)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub(crate) fn reconnect_attempt(&self) -> u32 {
        self.link.lock().attempts
    }

    pub(crate) fn url(&self) -> &str {
        &self.config.url
    }

    pub(crate) fn status(&self) -> &ConnectionStatusTracker {
        &self.status
    }

    /// Serialize `payload` and hand it to the live transport.
    ///
    /// Fails with [`NetworkError::NotConnected`] unless a transport is open.
    /// Nothing is buffered.
    pub(crate) fn send(&self, payload: Payload) -> Result<()> {
        let frame = self.config.serializer.serialize(payload);
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: Frame) -> Result<()> {
        let link = self.link.lock();
        match (link.state, link.transport.as_ref()) {
            (ConnectionState::Connected, Some(transport)) => transport.send(frame),
            _ => {
                tracing::trace!(target: targets::CONNECTION, state = ?link.state, "send rejected");
                Err(NetworkError::NotConnected)
            }
        }
    }

    /// Tear down for good. Idempotent.
    pub(crate) fn shutdown(&self) {
        let _serial = self.serial.lock();
        if self.state().is_closed() {
            return;
        }
        tracing::debug!(target: targets::CONNECTION, url = %self.config.url, "shutdown requested");
        self.terminate();
        self.stop.notify_one();
    }

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>) {
        let mut timer: Option<Interval> = None;

        loop {
            let directive = tokio::select! {
                biased;
                _ = self.stop.notified() => Directive::Terminate,
                Some((generation, event)) = events.recv() => self.handle_event(generation, event),
                _ = next_tick(&mut timer) => self.handle_tick(),
            };

            match directive {
                Directive::Continue => {}
                Directive::StartTimer => {
                    if timer.is_none() {
                        timer = Some(reconnect_timer(self.config.reconnect.interval));
                    }
                }
                Directive::StopTimer => timer = None,
                Directive::Terminate => break,
            }
        }

        tracing::debug!(target: targets::CONNECTION, "event loop stopped");
    }

    fn handle_event(&self, generation: u64, event: TransportEvent) -> Directive {
        let _serial = self.serial.lock();
        {
            let link = self.link.lock();
            if link.state.is_closed() {
                return Directive::Terminate;
            }
            if generation != link.generation || link.transport.is_none() {
                tracing::trace!(
                    target: targets::CONNECTION,
                    generation,
                    current = link.generation,
                    "ignoring event from detached transport"
                );
                return Directive::Continue;
            }
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(frame) => {
                self.on_message(frame);
                Directive::Continue
            }
            TransportEvent::Error(error) => {
                self.on_error(error);
                Directive::Continue
            }
            TransportEvent::Close(reason) => self.on_close(reason),
        }
    }

    fn on_open(&self) -> Directive {
        let was_reconnecting = {
            let mut link = self.link.lock();
            link.state = ConnectionState::Connected;
            link.attempts = 0;
            std::mem::replace(&mut link.reconnecting, false)
        };
        tracing::info!(target: targets::CONNECTION, url = %self.config.url, "connected");
        self.status.push(true);

        if was_reconnecting {
            Directive::StopTimer
        } else {
            Directive::Continue
        }
    }

    fn on_message(&self, frame: Frame) {
        let decoded = self.config.deserializer.deserialize(frame);
        self.mux.dispatch(Envelope::classify(decoded));
    }

    fn on_error(&self, error: TransportError) {
        tracing::warn!(
            target: targets::CONNECTION,
            error = %error,
            recoverable = error.recoverable,
            "transport error"
        );
        self.mux.dispatch_error(error);
    }

    fn on_close(&self, reason: Option<CloseReason>) -> Directive {
        let max_attempts = self.config.reconnect.max_attempts;
        let (detached, already_reconnecting, attempts) = {
            let mut link = self.link.lock();
            let detached = link.transport.take();
            link.generation += 1;
            let already_reconnecting = link.reconnecting;
            if !already_reconnecting && max_attempts > 0 {
                link.reconnecting = true;
                link.state = ConnectionState::Reconnecting;
            }
            (detached, already_reconnecting, link.attempts)
        };
        drop(detached);

        tracing::debug!(
            target: targets::CONNECTION,
            code = reason.as_ref().map(|r| r.code),
            attempts,
            "transport closed"
        );
        self.status.push(false);

        if already_reconnecting {
            if attempts >= max_attempts {
                tracing::info!(target: targets::CONNECTION, attempts, "reconnection attempts exhausted");
                self.terminate();
                return Directive::Terminate;
            }
            return Directive::Continue;
        }
        if max_attempts == 0 {
            tracing::info!(target: targets::CONNECTION, "reconnection disabled, closing");
            self.terminate();
            return Directive::Terminate;
        }
        Directive::StartTimer
    }

    fn handle_tick(&self) -> Directive {
        let _serial = self.serial.lock();
        let max_attempts = self.config.reconnect.max_attempts;
        let attempt = {
            let mut link = self.link.lock();
            if link.state.is_closed() {
                return Directive::Terminate;
            }
            if link.transport.is_some() {
                tracing::trace!(target: targets::CONNECTION, "transport live, skipping tick");
                return Directive::Continue;
            }
            if link.attempts >= max_attempts {
                drop(link);
                self.terminate();
                return Directive::Terminate;
            }
            link.attempts += 1;
            link.attempts
        };

        tracing::info!(target: targets::CONNECTION, attempt, max_attempts, "reconnecting");
        self.connect();
        Directive::Continue
    }

    /// Open a new transport unless one is live or the client is closed.
    fn connect(&self) {
        let events = {
            let mut link = self.link.lock();
            if link.state.is_closed() || link.transport.is_some() {
                return;
            }
            if link.state == ConnectionState::Idle {
                link.state = ConnectionState::Connecting;
            }
            link.generation += 1;
            TransportEvents::new(link.generation, self.events.clone())
        };

        let generation = events.generation();
        tracing::debug!(target: targets::CONNECTION, generation, "opening transport");
        let transport = self.config.connector.connect(&self.request, events);

        let mut link = self.link.lock();
        if link.state.is_closed() || link.generation != generation {
            drop(link);
            transport.close(Some(CloseReason::normal()));
            return;
        }
        link.transport = Some(transport);
    }

    /// Enter the terminal state exactly once.
    fn terminate(&self) {
        let detached = {
            let mut link = self.link.lock();
            if link.state.is_closed() {
                return;
            }
            link.state = ConnectionState::Closed;
            link.reconnecting = false;
            link.generation += 1;
            link.transport.take()
        };
        if let Some(transport) = detached {
            transport.close(Some(CloseReason::normal()));
        }

        tracing::info!(target: targets::CONNECTION, url = %self.config.url, "closed");
        self.status.push(false);
        self.status.complete();
        self.mux.complete();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.link.lock();
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url)
            .field("state", &link.state)
            .field("generation", &link.generation)
            .field("attempts", &link.attempts)
            .finish()
    }
}

fn reconnect_timer(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Wait for the next tick, or forever when no timer is running.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connector;

    /// Connects nowhere and never reports anything.
    struct Silent;

    struct Inert;

    impl Transport for Inert {
        fn send(&self, _frame: Frame) -> Result<()> {
            Ok(())
        }

        fn close(&self, _reason: Option<CloseReason>) {}
    }

    impl Connector for Silent {
        fn connect(&self, _request: &ConnectRequest, _events: TransportEvents) -> Box<dyn Transport> {
            Box::new(Inert)
        }
    }

    fn start(config: ClientConfig) -> Arc<ConnectionManager> {
        ConnectionManager::start(config.connector(Silent), Arc::new(Multiplexer::new())).unwrap()
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let manager = start(ClientConfig::new("ws://localhost:9000"));
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(
            manager.send(Payload::from("early")),
            Err(NetworkError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let manager = start(ClientConfig::new("ws://localhost:9000"));
        manager.shutdown();
        manager.shutdown();
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(manager.status().is_complete());
        assert_eq!(manager.status().current(), Some(false));
    }

    #[test]
    fn test_start_requires_runtime() {
        let err = ConnectionManager::start(
            ClientConfig::new("ws://localhost:9000").connector(Silent),
            Arc::new(Multiplexer::new()),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::NoRuntime(_)));
    }

    #[test]
    fn test_invalid_url_is_reported_before_runtime_check() {
        let err = ConnectionManager::start(ClientConfig::new("ftp://nope"), Arc::new(Multiplexer::new()))
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl(_)));
    }

    #[test]
    fn test_zero_period_timer_is_clamped() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let timer = reconnect_timer(Duration::ZERO);
            assert_eq!(timer.period(), Duration::from_millis(1));
        });
    }
}

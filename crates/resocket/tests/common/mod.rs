//! A scripted in-memory connector for driving the client deterministically.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use resocket::{
    CloseReason, ConnectRequest, Connector, Frame, NetworkError, Result, Transport, TransportError,
    TransportEvents,
};

/// What a freshly created transport does on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Nothing; the test reports events by hand.
    Manual,
    /// Report an error and close right away, like a refused connection.
    Refuse,
    /// Report a completed handshake right away.
    Accept,
}

#[derive(Default)]
struct Script {
    behavior: Option<Behavior>,
    transports: Vec<TransportEvents>,
    requests: Vec<ConnectRequest>,
    sent: Vec<Frame>,
    closed: Vec<(u64, Option<CloseReason>)>,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new(behavior: Behavior) -> Self {
        let connector = Self::default();
        connector.set_behavior(behavior);
        connector
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.script.lock().behavior = Some(behavior);
    }

    /// Number of transports created so far.
    pub fn attempts(&self) -> usize {
        self.script.lock().transports.len()
    }

    /// The event sink of the `index`-th transport.
    pub fn transport(&self, index: usize) -> TransportEvents {
        self.script.lock().transports[index].clone()
    }

    /// The event sink of the newest transport.
    pub fn last(&self) -> TransportEvents {
        let script = self.script.lock();
        script.transports[script.transports.len() - 1].clone()
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.script.lock().requests.clone()
    }

    /// Every frame handed to any transport, in order.
    pub fn sent(&self) -> Vec<Frame> {
        self.script.lock().sent.clone()
    }

    /// Generations of transports the client closed.
    pub fn closed(&self) -> Vec<(u64, Option<CloseReason>)> {
        self.script.lock().closed.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, request: &ConnectRequest, events: TransportEvents) -> Box<dyn Transport> {
        let behavior = {
            let mut script = self.script.lock();
            script.transports.push(events.clone());
            script.requests.push(request.clone());
            script.behavior.unwrap_or(Behavior::Manual)
        };

        match behavior {
            Behavior::Manual => {}
            Behavior::Refuse => {
                events.error(TransportError::new("connection refused"));
                events.close(Some(CloseReason::abnormal()));
            }
            Behavior::Accept => events.open(),
        }

        Box::new(ScriptedTransport {
            generation: events.generation(),
            script: self.script.clone(),
        })
    }
}

struct ScriptedTransport {
    generation: u64,
    script: Arc<Mutex<Script>>,
}

impl Transport for ScriptedTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        let mut script = self.script.lock();
        if script.closed.iter().any(|(generation, _)| *generation == self.generation) {
            return Err(NetworkError::NotConnected);
        }
        script.sent.push(frame);
        Ok(())
    }

    fn close(&self, reason: Option<CloseReason>) {
        self.script.lock().closed.push((self.generation, reason));
    }
}

/// Install a test subscriber once; `RUST_LOG=resocket=trace` shows the
/// client's lifecycle.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

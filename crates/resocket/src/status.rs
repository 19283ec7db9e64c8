//! De-duplicated connection status.

use std::sync::Arc;

use resocket_core::{ConnectionId, EventStream, Property, Signal};

/// Tracks whether the client is connected and emits only real transitions.
///
/// No two consecutive emitted values are equal. Once completed the tracker
/// emits nothing further and new subscribers see an already-ended stream.
pub(crate) struct ConnectionStatusTracker {
    last: Property<Option<bool>>,
    changed: Arc<Signal<bool>>,
}

impl ConnectionStatusTracker {
    pub(crate) fn new() -> Self {
        Self {
            last: Property::new(None),
            changed: Arc::new(Signal::new()),
        }
    }

    /// Record a status. Returns whether it was emitted.
    pub(crate) fn push(&self, connected: bool) -> bool {
        if self.changed.is_closed() || !self.last.set(Some(connected)) {
            return false;
        }
        self.changed.emit(connected);
        true
    }

    /// The most recently emitted status, if any.
    pub(crate) fn current(&self) -> Option<bool> {
        self.last.get()
    }

    pub(crate) fn on_change<F>(&self, handler: F) -> ConnectionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.changed.connect(move |&connected| handler(connected))
    }

    pub(crate) fn disconnect(&self, id: ConnectionId) -> bool {
        self.changed.disconnect(id)
    }

    /// Transitions from now on; ends when the tracker completes.
    pub(crate) fn stream(&self) -> EventStream<bool> {
        EventStream::from_signal(&self.changed)
    }

    /// Finish: end every stream and drop every handler. Idempotent.
    pub(crate) fn complete(&self) -> bool {
        self.changed.close()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.changed.is_closed()
    }
}

impl std::fmt::Debug for ConnectionStatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStatusTracker")
            .field("current", &self.current())
            .field("complete", &self.is_complete())
            .finish()
    }
}

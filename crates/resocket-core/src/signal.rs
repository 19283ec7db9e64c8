//! Signal/slot system for resocket.
//!
//! A [`Signal<Args>`] is an ordered list of callbacks ("slots"). Emitting the
//! signal invokes every connected slot, in the order they were connected, on
//! the emitting thread.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The main signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//! - [`ConnectionGuard`] - RAII guard that disconnects when dropped
//!
//! # Completion
//!
//! A signal can be closed with [`Signal::close`]. Closing drops every slot
//! (and whatever the slots captured, such as channel senders), turns every
//! later [`emit`](Signal::emit) into a no-op, and makes later
//! [`connect`](Signal::connect) calls drop their slot immediately. This is how
//! event streams built on top of a signal observe completion.
//!
//! # Re-entrancy
//!
//! Slots are invoked after the internal lock has been released, so a slot
//! may connect, disconnect or emit on the same signal without deadlocking.
//! Slots connected while an emission is in progress are not invoked by that
//! emission.
//!
//! # Example
//!
//! ```
//! use resocket_core::Signal;
//!
//! // Create a signal that passes a string argument
//! let text_changed = Signal::<String>::new();
//!
//! // Connect a slot (closure)
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! // Emit the signal
//! text_changed.emit("Hello, World!".to_string());
//!
//! // Disconnect when done
//! text_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    /// The ID remains valid until the connection is explicitly disconnected,
    /// the signal is closed, or the signal is dropped.
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Slot storage. `order` keeps connection order; `slots` owns the callbacks.
struct Connections<Args> {
    slots: SlotMap<ConnectionId, Slot<Args>>,
    order: Vec<ConnectionId>,
    closed: bool,
}

impl<Args> Connections<Args> {
    fn snapshot(&self) -> Vec<Slot<Args>> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(*id).cloned())
            .collect()
    }
}

/// A type-safe signal that can have multiple connected slots.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments, or a tuple like `(String, i32)` for multiple arguments.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync` and can be shared between threads behind
/// an `Arc`. Slots always run on the thread that calls [`emit`](Self::emit).
pub struct Signal<Args> {
    connections: Mutex<Connections<Args>>,
}

impl<Args: Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Connections {
                slots: SlotMap::with_key(),
                order: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    /// If the signal is already closed the slot is dropped immediately and the
    /// returned ID refers to nothing.
    ///
    /// # Example
    ///
    /// ```
    /// use resocket_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let id = signal.connect(|s| println!("Got: {}", s));
    /// signal.emit("Hello".to_string());
    /// ```
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let mut connections = self.connections.lock();
        if connections.closed {
            drop(connections);
            tracing::trace!(target: targets::SIGNAL, "connect on closed signal, dropping slot");
            drop(slot);
            return ConnectionId::default();
        }
        let id = connections.slots.insert(Arc::new(slot));
        connections.order.push(id);
        id
    }

    /// Connect a slot and return a guard that disconnects it when dropped.
    pub fn connect_scoped<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        ConnectionGuard::connect(self, slot)
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut connections = self.connections.lock();
            let removed = connections.slots.remove(id);
            if removed.is_some() {
                connections.order.retain(|other| *other != id);
            }
            removed
        };
        // The slot is dropped outside the lock; it may own arbitrary state.
        removed.is_some()
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().slots.len()
    }

    /// Close the signal: drop every slot and refuse all future ones.
    ///
    /// Returns `false` if the signal was already closed.
    pub fn close(&self) -> bool {
        let slots = {
            let mut connections = self.connections.lock();
            if connections.closed {
                return false;
            }
            connections.closed = true;
            connections.order.clear();
            std::mem::take(&mut connections.slots)
        };
        tracing::trace!(target: targets::SIGNAL, dropped = slots.len(), "signal closed");
        drop(slots);
        true
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.connections.lock().closed
    }

    /// Emit the signal, invoking all connected slots in connection order.
    ///
    /// Does nothing once the signal is closed.
    pub fn emit(&self, args: Args) {
        let slots = {
            let connections = self.connections.lock();
            if connections.closed {
                return;
            }
            connections.snapshot()
        };
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        for slot in slots {
            slot(&args);
        }
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connections = self.connections.lock();
        f.debug_struct("Signal")
            .field("connections", &connections.slots.len())
            .field("closed", &connections.closed)
            .finish()
    }
}

/// A connection guard that automatically disconnects when dropped.
///
/// The guard holds a weak reference, so it never keeps the signal alive and
/// dropping it after the signal is gone is harmless.
///
/// # Example
///
/// ```
/// use resocket_core::{ConnectionGuard, Signal};
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let signal = Arc::new(Signal::<i32>::new());
/// let counter = Arc::new(AtomicI32::new(0));
/// {
///     let counter_clone = counter.clone();
///     let _guard = ConnectionGuard::connect(&signal, move |&n| {
///         counter_clone.fetch_add(n, Ordering::SeqCst);
///     });
///     signal.emit(42);  // counter = 42
/// }
/// signal.emit(43);  // Nothing happens - connection was dropped
/// assert_eq!(counter.load(Ordering::SeqCst), 42);
/// ```
pub struct ConnectionGuard<Args: Send + 'static> {
    signal: Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: Send + 'static> ConnectionGuard<Args> {
    /// Connect `slot` to `signal` and return a guard owning the connection.
    pub fn connect<F>(signal: &Arc<Signal<Args>>, slot: F) -> Self
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = signal.connect(slot);
        Self {
            signal: Arc::downgrade(signal),
            id,
        }
    }
}

impl<Args: Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

impl<Args: Send + 'static> std::fmt::Debug for ConnectionGuard<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard").field("id", &self.id).finish()
    }
}

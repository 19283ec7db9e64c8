//! Core event primitives for resocket.
//!
//! This crate provides the building blocks the client uses to deliver events:
//!
//! - **Signal/Slot System**: Ordered, thread-safe callback lists with
//!   connection IDs, RAII guards and terminal completion
//! - **Property System**: Values with change detection
//! - **Event Streams**: Async `Stream`s fed by signals
//! - **Logging**: Target and span conventions for `tracing`
//!
//! # Signal/Slot Example
//!
//! ```
//! use resocket_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//!
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! value_changed.emit(42);
//! value_changed.disconnect(conn_id);
//! ```

pub mod logging;
pub mod property;
pub mod signal;
pub mod stream;

pub use property::Property;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use stream::EventStream;

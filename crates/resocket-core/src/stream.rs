//! Push-based event streams fed by signals.
//!
//! An [`EventStream`] is the pull side of a [`Signal`] connection: every emit
//! pushes a value into an unbounded channel and the stream yields it. The
//! stream ends when the signal is closed (its slot, and with it the channel
//! sender, is dropped). Dropping the stream disconnects its slot and then runs
//! the hook set with [`EventStream::on_detach`], if any.
//!
//! ```
//! use std::sync::Arc;
//! use resocket_core::{EventStream, Signal};
//!
//! # tokio_test_block_on(async {
//! let signal = Arc::new(Signal::<u32>::new());
//! let mut stream = EventStream::from_signal(&signal);
//!
//! signal.emit(7);
//! signal.close();
//!
//! assert_eq!(stream.next().await, Some(7));
//! assert_eq!(stream.next().await, None);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::signal::{ConnectionGuard, Signal};

/// Type-erased connection guard, so streams can be fed by any signal type.
trait Detach: Send + Sync {}

impl<Args: Send + 'static> Detach for ConnectionGuard<Args> {}

type DetachHook = Box<dyn FnOnce() + Send + Sync>;

/// A stream of values pushed by a [`Signal`].
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    guard: Option<Box<dyn Detach>>,
    on_detach: Option<DetachHook>,
}

impl<T: Send + 'static> EventStream<T> {
    /// Subscribe to `signal`, yielding a clone of every emitted value.
    pub fn from_signal(signal: &Arc<Signal<T>>) -> Self
    where
        T: Clone,
    {
        Self::filter_map(signal, |value: &T| Some(value.clone()))
    }

    /// Subscribe to `signal`, yielding the values for which `f` returns `Some`.
    pub fn filter_map<S, F>(signal: &Arc<Signal<S>>, f: F) -> Self
    where
        S: Send + 'static,
        F: Fn(&S) -> Option<T> + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let guard = ConnectionGuard::connect(signal, move |value: &S| {
            if let Some(mapped) = f(value) {
                // The receiver may already be gone; the guard cleans up on drop.
                let _ = sender.send(mapped);
            }
        });
        Self {
            receiver,
            guard: Some(Box::new(guard)),
            on_detach: None,
        }
    }

    /// A stream that is already complete.
    pub fn ended() -> Self {
        let (_, receiver) = mpsc::unbounded_channel();
        Self {
            receiver,
            guard: None,
            on_detach: None,
        }
    }

    /// A stream that yields `item` once and then completes.
    pub fn once(item: T) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(item);
        Self {
            receiver,
            guard: None,
            on_detach: None,
        }
    }

    /// Run `hook` once the stream is dropped, after its slot was
    /// disconnected. Owners use it to release per-subscription bookkeeping.
    pub fn on_detach<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.on_detach = Some(Box::new(hook));
        self
    }

    /// Wait for the next value. Returns `None` once the stream has completed.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take a value if one is buffered, without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Whether the stream has completed and every buffered value was taken.
    pub fn is_terminated(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

impl<T: Send + 'static> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Some(hook) = self.on_detach.take() {
            hook();
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("buffered", &self.receiver.len())
            .field("closed", &self.receiver.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_receives_emits_in_order() {
        let signal = Arc::new(Signal::<i32>::new());
        let mut stream = EventStream::from_signal(&signal);

        signal.emit(1);
        signal.emit(2);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
        assert_eq!(stream.try_next(), None);
        assert!(!stream.is_terminated());
    }

    #[tokio::test]
    async fn test_stream_ends_when_signal_closes() {
        let signal = Arc::new(Signal::<i32>::new());
        let mut stream = EventStream::from_signal(&signal);

        signal.emit(5);
        signal.close();

        assert_eq!(stream.next().await, Some(5));
        assert_eq!(stream.next().await, None);
        assert!(stream.is_terminated());
    }

    #[tokio::test]
    async fn test_stream_on_closed_signal_ends_immediately() {
        let signal = Arc::new(Signal::<i32>::new());
        signal.close();

        let mut stream = EventStream::from_signal(&signal);
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_dropping_stream_disconnects() {
        let signal = Arc::new(Signal::<i32>::new());
        let stream = EventStream::from_signal(&signal);
        assert_eq!(signal.connection_count(), 1);
        drop(stream);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_detach_hook_runs_after_disconnect() {
        let signal = Arc::new(Signal::<i32>::new());
        let seen = Arc::new(parking_lot::Mutex::new(None));

        let signal_clone = signal.clone();
        let seen_clone = seen.clone();
        let stream = EventStream::from_signal(&signal).on_detach(move || {
            *seen_clone.lock() = Some(signal_clone.connection_count());
        });
        assert_eq!(*seen.lock(), None);

        drop(stream);
        assert_eq!(*seen.lock(), Some(0));
    }

    #[tokio::test]
    async fn test_filter_map_and_once() {
        let signal = Arc::new(Signal::<i32>::new());
        let mut evens = EventStream::filter_map(&signal, |n: &i32| (n % 2 == 0).then(|| n * 10));

        for n in 1..=4 {
            signal.emit(n);
        }
        signal.close();

        assert_eq!(evens.next().await, Some(20));
        assert_eq!(evens.next().await, Some(40));
        assert_eq!(evens.next().await, None);

        let mut single = EventStream::once("done");
        assert_eq!(single.next().await, Some("done"));
        assert_eq!(single.next().await, None);

        let mut empty = EventStream::<()>::ended();
        assert_eq!(empty.next().await, None);
    }
}

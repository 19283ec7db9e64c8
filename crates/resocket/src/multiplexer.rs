//! Routing of inbound envelopes to subscribers.
//!
//! The registry maps an event name to a [`Signal`] holding that event's
//! handlers in registration order. Each inbound envelope is looked up once and
//! fanned out; binary payloads skip name matching and go to every byte
//! subscriber. Registrations outlive individual connections and end only when
//! the client reaches its terminal state.
//!
//! The names `close` and `error` are reserved. Registering under them
//! subscribes to the client's lifecycle instead of to data events, and no data
//! event with those names is ever delivered.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use resocket_core::logging::targets;
use resocket_core::{ConnectionId, EventStream, Signal};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::TransportError;

/// Reserved event name for the terminal close.
pub const CLOSE_EVENT: &str = "close";
/// Reserved event name for transport errors.
pub const ERROR_EVENT: &str = "error";

/// Identifies one registered handler. Pass it back to
/// [`Client::off`](crate::Client::off) together with the event name.
pub type SubscriptionId = ConnectionId;

struct Registry {
    topics: HashMap<String, Arc<Signal<Value>>>,
    terminated: bool,
}

impl Registry {
    /// Drop `event`'s entry if it is still `topic` and nobody listens to it.
    fn prune(&mut self, event: &str, topic: &Arc<Signal<Value>>) {
        let idle = self
            .topics
            .get(event)
            .is_some_and(|current| Arc::ptr_eq(current, topic) && current.connection_count() == 0);
        if idle {
            self.topics.remove(event);
        }
    }
}

pub(crate) struct Multiplexer {
    registry: Arc<Mutex<Registry>>,
    bytes: Arc<Signal<Bytes>>,
    raw: Arc<Signal<Value>>,
    envelopes: Arc<Signal<Envelope>>,
    closed: Arc<Signal<()>>,
    errors: Arc<Signal<TransportError>>,
}

impl Multiplexer {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                topics: HashMap::new(),
                terminated: false,
            })),
            bytes: Arc::new(Signal::new()),
            raw: Arc::new(Signal::new()),
            envelopes: Arc::new(Signal::new()),
            closed: Arc::new(Signal::new()),
            errors: Arc::new(Signal::new()),
        }
    }

    /// Route one envelope. Envelopes that match no subscription are dropped.
    pub(crate) fn dispatch(&self, envelope: Envelope) {
        if self.envelopes.connection_count() > 0 {
            self.envelopes.emit(envelope.clone());
        }
        match envelope {
            Envelope::Text { event, data } => {
                let Some(data) = data else { return };
                if is_reserved(&event) {
                    return;
                }
                let topic = self.registry.lock().topics.get(&event).cloned();
                if let Some(topic) = topic {
                    topic.emit(data);
                }
            }
            Envelope::Binary { payload } => self.bytes.emit(payload),
            Envelope::Raw { value } => self.raw.emit(value),
        }
    }

    /// Deliver a transport error to error subscribers.
    pub(crate) fn dispatch_error(&self, error: TransportError) {
        self.errors.emit(error);
    }

    /// Enter the terminal state: fire close once, then end every stream and
    /// drop every handler. Returns `false` if already terminated.
    pub(crate) fn complete(&self) -> bool {
        let topics = {
            let mut registry = self.registry.lock();
            if registry.terminated {
                return false;
            }
            registry.terminated = true;
            std::mem::take(&mut registry.topics)
        };

        tracing::debug!(target: targets::MULTIPLEXER, topics = topics.len(), "completing subscriptions");
        self.closed.emit(());

        for topic in topics.values() {
            topic.close();
        }
        self.bytes.close();
        self.raw.close();
        self.envelopes.close();
        self.errors.close();
        self.closed.close();
        true
    }

    /// Register a handler for `event`.
    pub(crate) fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        match event {
            CLOSE_EVENT => self.on_close(move || handler(&Value::Null)),
            ERROR_EVENT => self.on_error(move |error| handler(&Value::String(error.message.clone()))),
            _ => {
                let mut registry = self.registry.lock();
                if registry.terminated {
                    return SubscriptionId::default();
                }
                tracing::trace!(target: targets::MULTIPLEXER, event, "handler registered");
                registry
                    .topics
                    .entry(event.to_owned())
                    .or_insert_with(|| Arc::new(Signal::new()))
                    .connect(handler)
            }
        }
    }

    /// Register a handler receiving `data` decoded as `T`. Payloads that do
    /// not decode are skipped.
    pub(crate) fn on_typed<T, F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.on(event, move |data| {
            if let Ok(value) = T::deserialize(data) {
                handler(value);
            }
        })
    }

    /// Remove one handler. Returns whether it was registered.
    pub(crate) fn off(&self, event: &str, id: SubscriptionId) -> bool {
        match event {
            CLOSE_EVENT => self.closed.disconnect(id),
            ERROR_EVENT => self.errors.disconnect(id),
            _ => {
                let mut registry = self.registry.lock();
                let Some(topic) = registry.topics.get(event) else {
                    return false;
                };
                let removed = topic.disconnect(id);
                if topic.connection_count() == 0 {
                    registry.topics.remove(event);
                }
                removed
            }
        }
    }

    /// A stream of `data` values for `event`. The event's entry is dropped
    /// with its last subscriber.
    pub(crate) fn stream(&self, event: &str) -> EventStream<Value> {
        match event {
            CLOSE_EVENT => {
                let registry = self.registry.lock();
                if registry.terminated {
                    return EventStream::once(Value::Null);
                }
                return EventStream::filter_map(&self.closed, |_: &()| Some(Value::Null));
            }
            ERROR_EVENT => {
                return EventStream::filter_map(&self.errors, |error: &TransportError| {
                    Some(Value::String(error.message.clone()))
                });
            }
            _ => {}
        }
        let mut registry = self.registry.lock();
        if registry.terminated {
            return EventStream::ended();
        }
        let topic = registry
            .topics
            .entry(event.to_owned())
            .or_insert_with(|| Arc::new(Signal::new()))
            .clone();
        drop(registry);

        let owner: Weak<Mutex<Registry>> = Arc::downgrade(&self.registry);
        let event = event.to_owned();
        EventStream::from_signal(&topic).on_detach(move || {
            if let Some(registry) = owner.upgrade() {
                registry.lock().prune(&event, &topic);
            }
        })
    }

    pub(crate) fn on_bytes<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.bytes.connect(handler)
    }

    pub(crate) fn off_bytes(&self, id: SubscriptionId) -> bool {
        self.bytes.disconnect(id)
    }

    pub(crate) fn bytes_stream(&self) -> EventStream<Bytes> {
        EventStream::from_signal(&self.bytes)
    }

    pub(crate) fn on_raw<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.raw.connect(handler)
    }

    pub(crate) fn off_raw(&self, id: SubscriptionId) -> bool {
        self.raw.disconnect(id)
    }

    pub(crate) fn raw_stream(&self) -> EventStream<Value> {
        EventStream::from_signal(&self.raw)
    }

    pub(crate) fn envelope_stream(&self) -> EventStream<Envelope> {
        EventStream::from_signal(&self.envelopes)
    }

    /// Register a terminal-close handler. Called at once if the terminal state
    /// was already reached.
    pub(crate) fn on_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let registry = self.registry.lock();
        if registry.terminated {
            drop(registry);
            handler();
            return SubscriptionId::default();
        }
        self.closed.connect(move |_| handler())
    }

    /// Fires once on the terminal close, then ends. A stream taken after the
    /// terminal state yields one `()` and ends.
    pub(crate) fn close_stream(&self) -> EventStream<()> {
        let registry = self.registry.lock();
        if registry.terminated {
            return EventStream::once(());
        }
        EventStream::from_signal(&self.closed)
    }

    pub(crate) fn on_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.errors.connect(handler)
    }

    pub(crate) fn error_stream(&self) -> EventStream<TransportError> {
        EventStream::from_signal(&self.errors)
    }

    /// Number of event names with at least one registration.
    #[cfg(test)]
    pub(crate) fn topic_count(&self) -> usize {
        self.registry.lock().topics.len()
    }
}

fn is_reserved(event: &str) -> bool {
    event.is_empty() || event == CLOSE_EVENT || event == ERROR_EVENT
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Multiplexer")
            .field("topics", &registry.topics.len())
            .field("terminated", &registry.terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn text(event: &str, data: Value) -> Envelope {
        Envelope::classify_value(json!({ "event": event, "data": data }))
    }

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |value: &T| seen_clone.lock().push(value.clone()))
    }

    #[test]
    fn test_exact_event_match_only() {
        let mux = Multiplexer::new();
        let (test_seen, test_handler) = recorder::<Value>();
        let (other_seen, other_handler) = recorder::<Value>();
        mux.on("test", test_handler);
        mux.on("other", other_handler);

        mux.dispatch(text("test", json!("hello")));
        mux.dispatch(text("Test", json!("case")));
        mux.dispatch(text("tes", json!("prefix")));

        assert_eq!(*test_seen.lock(), vec![json!("hello")]);
        assert!(other_seen.lock().is_empty());
    }

    #[test]
    fn test_absent_data_and_reserved_names_are_dropped() {
        let mux = Multiplexer::new();
        let (seen, handler) = recorder::<Value>();
        mux.on("ping", handler);
        let (closes, close_handler) = recorder::<Value>();
        mux.on("close", close_handler);

        mux.dispatch(Envelope::classify_value(json!({"event": "ping"})));
        mux.dispatch(text("ping", Value::Null));
        mux.dispatch(text("close", json!("spoofed")));
        mux.dispatch(text("", json!("nameless")));
        mux.dispatch(text("ping", json!(0)));

        assert_eq!(*seen.lock(), vec![json!(0)]);
        assert!(closes.lock().is_empty());
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let mux = Multiplexer::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            mux.on("tick", move |_| order.lock().push(tag));
        }
        mux.dispatch(text("tick", json!(1)));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_binary_goes_to_every_byte_subscriber() {
        let mux = Multiplexer::new();
        let (first, first_handler) = recorder::<Bytes>();
        let (second, second_handler) = recorder::<Bytes>();
        mux.on_bytes(first_handler);
        mux.on_bytes(second_handler);

        mux.dispatch(Envelope::classify_value(json!({"type": "binary", "binaryData": "hi"})));

        assert_eq!(*first.lock(), vec![Bytes::from_static(b"hi")]);
        assert_eq!(*second.lock(), vec![Bytes::from_static(b"hi")]);
    }

    #[test]
    fn test_raw_values_reach_raw_subscribers() {
        let mux = Multiplexer::new();
        let (seen, handler) = recorder::<Value>();
        mux.on_raw(handler);
        mux.dispatch(Envelope::classify_value(json!("plain text")));
        assert_eq!(*seen.lock(), vec![json!("plain text")]);
    }

    #[test]
    fn test_off_removes_handler_and_empty_topic() {
        let mux = Multiplexer::new();
        let (seen, handler) = recorder::<Value>();
        let id = mux.on("chat", handler);
        assert_eq!(mux.topic_count(), 1);

        assert!(mux.off("chat", id));
        assert!(!mux.off("chat", id));
        assert_eq!(mux.topic_count(), 0);

        mux.dispatch(text("chat", json!("ignored")));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_dropped_streams_release_their_topics() {
        let mux = Multiplexer::new();
        for n in 0..1000 {
            drop(mux.stream(&format!("reply-{n}")));
        }
        assert_eq!(mux.topic_count(), 0);

        let (_, handler) = recorder::<Value>();
        let id = mux.on("chat", handler);
        let first = mux.stream("chat");
        let second = mux.stream("chat");
        assert!(mux.off("chat", id));
        drop(first);
        assert_eq!(mux.topic_count(), 1);

        drop(second);
        assert_eq!(mux.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_resubscribes_after_its_topic_was_released() {
        let mux = Multiplexer::new();
        drop(mux.stream("chat"));

        let mut stream = mux.stream("chat");
        mux.dispatch(text("chat", json!(1)));
        assert_eq!(stream.next().await, Some(json!(1)));
        assert_eq!(mux.topic_count(), 1);
    }

    #[test]
    fn test_typed_handlers_skip_undecodable_payloads() {
        #[derive(Debug, Clone, PartialEq, Deserialize)]
        struct Chat {
            from: String,
            body: String,
        }

        let mux = Multiplexer::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        mux.on_typed("chat", move |chat: Chat| seen_clone.lock().push(chat));

        mux.dispatch(text("chat", json!({"from": "ana", "body": "hi"})));
        mux.dispatch(text("chat", json!("not a chat")));

        assert_eq!(
            *seen.lock(),
            vec![Chat {
                from: "ana".into(),
                body: "hi".into()
            }]
        );
    }

    #[test]
    fn test_legacy_error_routing() {
        let mux = Multiplexer::new();
        let (seen, handler) = recorder::<Value>();
        let id = mux.on("error", handler);
        mux.dispatch_error(TransportError::new("connection refused"));
        assert!(mux.off("error", id));
        mux.dispatch_error(TransportError::new("again"));
        assert_eq!(*seen.lock(), vec![json!("connection refused")]);
    }

    #[test]
    fn test_complete_fires_close_once_and_drops_everything() {
        let mux = Multiplexer::new();
        let (closes, close_handler) = recorder::<Value>();
        mux.on("close", close_handler);
        let (seen, handler) = recorder::<Value>();
        mux.on("chat", handler);

        assert!(mux.complete());
        assert!(!mux.complete());

        mux.dispatch(text("chat", json!("after")));
        assert_eq!(*closes.lock(), vec![Value::Null]);
        assert!(seen.lock().is_empty());
        assert_eq!(mux.on("chat", |_| {}), SubscriptionId::default());
        assert_eq!(mux.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_streams_end_on_complete() {
        let mux = Multiplexer::new();
        let mut chat = mux.stream("chat");
        let mut bytes = mux.bytes_stream();
        let mut closes = mux.close_stream();

        mux.dispatch(text("chat", json!("one")));
        mux.complete();

        assert_eq!(chat.next().await, Some(json!("one")));
        assert_eq!(chat.next().await, None);
        assert_eq!(bytes.next().await, None);
        assert_eq!(closes.next().await, Some(()));
        assert_eq!(closes.next().await, None);
    }

    #[tokio::test]
    async fn test_late_subscribers_after_complete() {
        let mux = Multiplexer::new();
        mux.complete();

        let mut late_close = mux.close_stream();
        assert_eq!(late_close.next().await, Some(()));
        assert_eq!(late_close.next().await, None);

        let fired = Arc::new(Mutex::new(0));
        let fired_clone = fired.clone();
        mux.on_close(move || *fired_clone.lock() += 1);
        assert_eq!(*fired.lock(), 1);

        assert_eq!(mux.stream("chat").next().await, None);
        assert_eq!(mux.error_stream().next().await, None);
    }
}

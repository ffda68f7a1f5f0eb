//! Topic registry, fanout and command delivery.

use crate::batch::BatchPolicy;
use crate::compression::WireEncode;
use crate::error::{BusError, BusResult};
use crate::topic::Topic;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

type SnapshotFn = Arc<dyn Fn() -> Vec<Value> + Send + Sync>;
type ReceiveFn = Arc<dyn Fn(Value) -> BusResult<()> + Send + Sync>;

#[derive(Default)]
struct TopicState {
    snapshot: Option<SnapshotFn>,
    receiver: Option<ReceiveFn>,
    subscribers: Vec<mpsc::UnboundedSender<Value>>,
}

#[derive(Default)]
struct BusInner {
    topics: DashMap<Topic, Arc<Mutex<TopicState>>>,
}

impl BusInner {
    fn topic(&self, topic: Topic) -> Arc<Mutex<TopicState>> {
        self.topics.entry(topic).or_default().clone()
    }
}

/// Handle to the bus. Cloning is cheap and shares the registry.
///
/// A null bus (`MessageBus::null()`) accepts every call and drops all
/// traffic; it is used when no operator transport exists.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Option<Arc<BusInner>>,
}

/// First snapshot, then every message published after it.
pub struct Subscription {
    pub topic: Topic,
    pub snapshot: Vec<Value>,
    pub messages: mpsc::UnboundedReceiver<Value>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            inner: Some(Arc::new(BusInner::default())),
        }
    }

    pub fn null() -> Self {
        Self { inner: None }
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Register the snapshot generator for `topic`.
    ///
    /// A topic has exactly one generator; a second registration fails.
    pub fn register_snapshot<F>(&self, topic: Topic, generator: F) -> BusResult<()>
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let state = inner.topic(topic);
        let mut state = state.lock();
        if state.snapshot.is_some() {
            error!(topic = %topic, "Duplicate snapshot generator registration");
            return Err(BusError::AlreadyRegistered {
                kind: "snapshot generator",
                topic,
            });
        }
        state.snapshot = Some(Arc::new(generator));
        Ok(())
    }

    /// Register the single inbound handler for a command topic.
    pub fn register_receiver<T, F>(&self, topic: Topic, handler: F) -> BusResult<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let state = inner.topic(topic);
        let mut state = state.lock();
        if state.receiver.is_some() {
            error!(topic = %topic, "Duplicate receiver registration");
            return Err(BusError::AlreadyRegistered {
                kind: "receiver",
                topic,
            });
        }
        state.receiver = Some(Arc::new(move |value: Value| {
            let msg = serde_json::from_value::<T>(value)
                .map_err(|source| BusError::Decode { topic, source })?;
            handler(msg);
            Ok(())
        }));
        Ok(())
    }

    /// Hand an inbound message to the topic's receiver.
    pub fn deliver(&self, topic: Topic, value: Value) -> BusResult<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        // Clone the handler out so it runs without the topic lock held.
        let handler = inner.topic(topic).lock().receiver.clone();
        match handler {
            Some(handler) => handler(value),
            None => Err(BusError::NoReceiver(topic)),
        }
    }

    /// Subscribe to `topic`.
    ///
    /// The snapshot is generated and the subscriber registered under the
    /// topic lock, so no publish can fall between the two.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let Some(inner) = &self.inner else {
            return Subscription {
                topic,
                snapshot: Vec::new(),
                messages: rx,
            };
        };
        let state = inner.topic(topic);
        let mut state = state.lock();
        let snapshot = state.snapshot.as_ref().map(|f| f()).unwrap_or_default();
        state.subscribers.push(tx);
        debug!(topic = %topic, subscribers = state.subscribers.len(), "New subscription");
        Subscription {
            topic,
            snapshot,
            messages: rx,
        }
    }

    /// Typed publishing handle for `topic`.
    pub fn publisher<T: WireEncode>(&self, topic: Topic) -> Publisher<T> {
        Publisher {
            bus: self.clone(),
            topic,
            batch: None,
            _marker: PhantomData,
        }
    }

    /// Batching policy on this bus; attach publishers with `Publisher::batched`.
    pub fn batch_policy(&self, delay: Option<Duration>) -> BatchPolicy {
        BatchPolicy::new(self.clone(), delay)
    }

    /// Typed receiving handle for `topic`.
    pub fn receiver<T: DeserializeOwned + 'static>(&self, topic: Topic) -> Receiver<T> {
        Receiver {
            bus: self.clone(),
            topic,
            _marker: PhantomData,
        }
    }

    /// Run `update` under the topic lock and fan out whatever it returns.
    ///
    /// Used by state holders that must change their value and publish it
    /// atomically with respect to new subscriptions.
    pub(crate) fn publish_with<F>(&self, topic: Topic, update: F) -> bool
    where
        F: FnOnce() -> Option<Value>,
    {
        let Some(inner) = &self.inner else {
            return update().is_some();
        };
        let state = inner.topic(topic);
        let mut state = state.lock();
        match update() {
            Some(value) => {
                fanout(topic, &mut state.subscribers, value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn publish_value(&self, topic: Topic, value: Value) {
        let Some(inner) = &self.inner else {
            return;
        };
        let state = inner.topic(topic);
        let mut state = state.lock();
        fanout(topic, &mut state.subscribers, value);
    }

    /// Number of live subscribers (for the application heartbeat).
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.topic(topic).lock().subscribers.len())
    }
}

fn fanout(topic: Topic, subscribers: &mut Vec<mpsc::UnboundedSender<Value>>, value: Value) {
    subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    trace!(topic = %topic, receivers = subscribers.len(), "Published");
}

/// Typed publishing handle.
pub struct Publisher<T> {
    bus: MessageBus,
    topic: Topic,
    batch: Option<BatchPolicy>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            topic: self.topic,
            batch: self.batch.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: WireEncode> Publisher<T> {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Deliver through `policy` instead of immediately.
    pub fn batched(mut self, policy: &BatchPolicy) -> Self {
        self.batch = Some(policy.clone());
        self
    }

    pub fn publish(&self, msg: &T) {
        if self.bus.is_null() {
            return;
        }
        let value = msg.encode();
        let value = match &self.batch {
            Some(batch) => match batch.defer(self.topic, value) {
                Some(value) => value,
                None => return,
            },
            None => value,
        };
        self.bus.publish_value(self.topic, value);
    }

    /// Run `update` and publish what it returns, atomically with respect
    /// to new subscriptions unless batching is active.
    pub(crate) fn publish_state<F>(&self, update: F) -> bool
    where
        F: FnOnce() -> Option<Value>,
    {
        match self.batch.as_ref().filter(|b| b.delay().is_some()) {
            Some(batch) => match update() {
                Some(value) => {
                    batch.enqueue(self.topic, value);
                    true
                }
                None => false,
            },
            None => self.bus.publish_with(self.topic, update),
        }
    }

    /// Register a snapshot generator producing typed messages.
    pub fn register_snapshot<F>(&self, generator: F) -> BusResult<()>
    where
        F: Fn() -> Vec<T> + Send + Sync + 'static,
    {
        self.bus.register_snapshot(self.topic, move || {
            generator().iter().map(WireEncode::encode).collect()
        })
    }
}

/// Typed receiving handle.
pub struct Receiver<T> {
    bus: MessageBus,
    topic: Topic,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + 'static> Receiver<T> {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn register<F>(&self, handler: F) -> BusResult<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.bus.register_receiver(self.topic, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_then_live() {
        let bus = MessageBus::new();
        let publisher = bus.publisher::<String>(Topic::Notepad);
        publisher
            .register_snapshot(|| vec!["hello".to_string()])
            .unwrap();

        publisher.publish(&"before".to_string());
        let mut sub = bus.subscribe(Topic::Notepad);
        publisher.publish(&"after".to_string());

        assert_eq!(sub.snapshot, vec![json!("hello")]);
        assert_eq!(sub.messages.recv().await.unwrap(), json!("after"));
        assert!(sub.messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fifo_per_subscriber() {
        let bus = MessageBus::new();
        let publisher = bus.publisher::<String>(Topic::Notepad);
        let mut a = bus.subscribe(Topic::Notepad);
        let mut b = bus.subscribe(Topic::Notepad);

        for i in 0..5 {
            publisher.publish(&i.to_string());
        }
        for i in 0..5 {
            assert_eq!(a.messages.recv().await.unwrap(), json!(i.to_string()));
            assert_eq!(b.messages.recv().await.unwrap(), json!(i.to_string()));
        }
    }

    #[test]
    fn test_second_snapshot_registration_fails() {
        let bus = MessageBus::new();
        bus.register_snapshot(Topic::FairValue, Vec::new).unwrap();

        let err = bus.register_snapshot(Topic::FairValue, Vec::new).unwrap_err();
        assert!(matches!(
            err,
            BusError::AlreadyRegistered {
                topic: Topic::FairValue,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "already registered snapshot generator for topic fairValue"
        );
    }

    #[test]
    fn test_second_receiver_registration_fails() {
        let bus = MessageBus::new();
        bus.register_receiver(Topic::ActiveChange, |_: bool| {}).unwrap();
        assert!(bus
            .register_receiver(Topic::ActiveChange, |_: bool| {})
            .is_err());
    }

    #[test]
    fn test_deliver_decodes_and_dispatches() {
        let bus = MessageBus::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        bus.receiver::<bool>(Topic::ActiveChange)
            .register(move |v| sink.lock().push(v))
            .unwrap();

        bus.deliver(Topic::ActiveChange, json!(true)).unwrap();
        assert!(bus.deliver(Topic::ActiveChange, json!("x")).is_err());
        assert!(matches!(
            bus.deliver(Topic::CancelAllOrders, json!(null)),
            Err(BusError::NoReceiver(Topic::CancelAllOrders))
        ));
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = MessageBus::new();
        let publisher = bus.publisher::<String>(Topic::Notepad);
        let sub = bus.subscribe(Topic::Notepad);
        assert_eq!(bus.subscriber_count(Topic::Notepad), 1);

        drop(sub);
        publisher.publish(&"x".to_string());
        assert_eq!(bus.subscriber_count(Topic::Notepad), 0);
    }

    #[tokio::test]
    async fn test_null_bus_drops_everything() {
        let bus = MessageBus::null();
        bus.register_snapshot(Topic::Trades, Vec::new).unwrap();
        bus.register_snapshot(Topic::Trades, Vec::new).unwrap();
        bus.publisher::<String>(Topic::Notepad).publish(&"x".to_string());

        let mut sub = bus.subscribe(Topic::Notepad);
        assert!(sub.snapshot.is_empty());
        assert!(sub.messages.recv().await.is_none());
        assert!(bus.deliver(Topic::ActiveChange, json!(true)).is_ok());
    }
}

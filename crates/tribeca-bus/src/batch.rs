//! Deferred delivery for high-frequency operator topics.

use crate::bus::MessageBus;
use crate::topic::Topic;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Flush cadence while delivery is immediate.
const IDLE_FLUSH: Duration = Duration::from_millis(250);

struct BatchState {
    delay: Option<Duration>,
    pending: Vec<(Topic, Value)>,
}

/// Batching policy shared by the publishers attached to it.
///
/// While a delay is set, attached publishers queue their messages and
/// `flush` delivers the queue in publish order. A state topic keeps only
/// its newest queued message; event streams keep every one.
#[derive(Clone)]
pub struct BatchPolicy {
    bus: MessageBus,
    state: Arc<Mutex<BatchState>>,
}

impl BatchPolicy {
    pub(crate) fn new(bus: MessageBus, delay: Option<Duration>) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(BatchState {
                delay,
                pending: Vec::new(),
            })),
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        self.state.lock().delay
    }

    /// Change the delay. Switching to immediate delivery flushes the queue.
    pub fn set_delay(&self, delay: Option<Duration>) {
        {
            let mut state = self.state.lock();
            if state.delay == delay {
                return;
            }
            state.delay = delay;
        }
        debug!(delay_ms = delay.map(|d| d.as_millis() as u64), "Publish batching changed");
        if delay.is_none() {
            self.flush();
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Queue `value` when a delay is set, otherwise hand it back.
    pub(crate) fn defer(&self, topic: Topic, value: Value) -> Option<Value> {
        let mut state = self.state.lock();
        if state.delay.is_none() {
            return Some(value);
        }
        Self::push(&mut state, topic, value);
        None
    }

    /// Queue `value` regardless of the delay; the next flush delivers it.
    pub(crate) fn enqueue(&self, topic: Topic, value: Value) {
        Self::push(&mut self.state.lock(), topic, value);
    }

    fn push(state: &mut BatchState, topic: Topic, value: Value) {
        if !topic.is_event_stream() {
            state.pending.retain(|(t, _)| *t != topic);
        }
        state.pending.push((topic, value));
    }

    /// Deliver everything queued. Returns the number of messages sent.
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending);
        let sent = pending.len();
        for (topic, value) in pending {
            self.bus.publish_value(topic, value);
        }
        if sent > 0 {
            trace!(sent, "Flushed batched messages");
        }
        sent
    }

    /// Flush once per delay until `stop` resolves, then flush what is left.
    pub async fn run<F>(self, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        loop {
            let wait = self.delay().unwrap_or(IDLE_FLUSH);
            tokio::select! {
                _ = &mut stop => break,
                _ = tokio::time::sleep(wait) => {
                    self.flush();
                }
            }
        }
        self.flush();
    }
}

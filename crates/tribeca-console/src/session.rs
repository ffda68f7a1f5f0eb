//! One operator connection's view of the bus.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tribeca_bus::{MessageBus, Subscription, Topic};

use crate::protocol::{ClientMessage, ServerMessage};

/// Turns client frames into bus subscriptions and deliveries. Everything
/// destined for the client is queued on `outgoing`.
pub struct Session {
    bus: MessageBus,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
    forwarders: HashMap<Topic, JoinHandle<()>>,
}

impl Session {
    pub fn new(bus: MessageBus, outgoing: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            bus,
            outgoing,
            forwarders: HashMap::new(),
        }
    }

    pub fn subscriptions(&self) -> usize {
        self.forwarders.len()
    }

    pub fn on_text(&mut self, text: &str) {
        let msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "Malformed client message");
                self.reply(ServerMessage::error(format!("Malformed message: {e}")));
                return;
            }
        };
        match msg {
            ClientMessage::Subscribe { topic } => match topic.parse::<Topic>() {
                Ok(topic) => self.subscribe(topic),
                Err(e) => self.reply(ServerMessage::error(e.to_string())),
            },
            ClientMessage::Message { topic, data } => match topic.parse::<Topic>() {
                Ok(topic) => {
                    if let Err(e) = self.bus.deliver(topic, data) {
                        warn!(topic = %topic, error = %e, "Operator message refused");
                        self.reply(ServerMessage::error(e.to_string()));
                    }
                }
                Err(e) => self.reply(ServerMessage::error(e.to_string())),
            },
        }
    }

    /// Send the topic snapshot, then forward every later message.
    /// Subscribing again restarts from a fresh snapshot.
    fn subscribe(&mut self, topic: Topic) {
        let Subscription {
            snapshot,
            mut messages,
            ..
        } = self.bus.subscribe(topic);
        self.reply(ServerMessage::snapshot(topic, snapshot));

        let outgoing = self.outgoing.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(value) = messages.recv().await {
                if outgoing.send(ServerMessage::message(topic, value)).is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.forwarders.insert(topic, forwarder) {
            previous.abort();
        }
        debug!(topic = %topic, "Operator subscribed");
    }

    fn reply(&self, msg: ServerMessage) {
        // Fails only once the writer is gone, and then the session ends.
        let _ = self.outgoing.send(msg);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for forwarder in self.forwarders.values() {
            forwarder.abort();
        }
    }
}

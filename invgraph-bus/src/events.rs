//! The process-wide topic bus: `Message`/`Event`/`Action`/`ActionDone`/
//! `ActionError`, and `EventBus`'s subscribe/emit semantics, ported from
//! `original_source/keepercore/core/event_bus.py`.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;

use serde_json::Value as Json;

/// Message type name used as the bus's routing key (`CoreEvent.*` constants
/// collapse to plain strings here).
pub type MessageType = String;

/// One message kind flowing through the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Event {
        message_type: MessageType,
        data: Json,
    },
    Action {
        message_type: MessageType,
        task_id: String,
        step: String,
    },
    ActionDone {
        message_type: MessageType,
        task_id: String,
        step: String,
        subscriber_id: String,
    },
    ActionError {
        message_type: MessageType,
        task_id: String,
        step: String,
        subscriber_id: String,
        error: String,
    },
}

impl Message {
    pub fn message_type(&self) -> &str {
        match self {
            Message::Event { message_type, .. }
            | Message::Action { message_type, .. }
            | Message::ActionDone { message_type, .. }
            | Message::ActionError { message_type, .. } => message_type,
        }
    }
}

const WILDCARD: &str = "*";
/// Each subscriber queue holds at most this many undelivered messages
/// before the sender blocks: natural back-pressure so a slow sink blocks a
/// fast source instead of unbounded buffering.
const QUEUE_CAPACITY: usize = 1024;

struct Listener {
    subscriber_id: String,
    message_types: Vec<MessageType>,
    sender: SyncSender<Message>,
}

/// A scoped subscription handle. Dropping it removes the listener from the
/// bus, the way `subscribe()`'s context manager unregisters on exit.
pub struct Subscription<'a> {
    bus: &'a EventBus,
    subscriber_id: String,
    listener_index: usize,
    pub receiver: Receiver<Message>,
}

impl<'a> Drop for Subscription<'a> {
    fn drop(&mut self) {
        self.bus.remove_listener(&self.subscriber_id, self.listener_index);
    }
}

/// Topic-keyed pub/sub bus. One queue per `subscribe` call; emission
/// broadcasts to every queue whose requested channels match the message
/// type, plus every wildcard subscriber.
pub struct EventBus {
    listeners: Mutex<Vec<Option<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to `message_types` (or `["*"]` for everything).
    pub fn subscribe(&self, subscriber_id: impl Into<String>, message_types: Vec<MessageType>) -> Subscription {
        let (tx, rx) = sync_channel(QUEUE_CAPACITY);
        let subscriber_id = subscriber_id.into();
        let mut listeners = self.listeners.lock().unwrap();
        let index = listeners.len();
        listeners.push(Some(Listener {
            subscriber_id: subscriber_id.clone(),
            message_types,
            sender: tx,
        }));
        Subscription {
            bus: self,
            subscriber_id,
            listener_index: index,
            receiver: rx,
        }
    }

    fn remove_listener(&self, subscriber_id: &str, index: usize) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(slot) = listeners.get_mut(index) {
            if slot.as_ref().map(|l| l.subscriber_id.as_str()) == Some(subscriber_id) {
                *slot = None;
            }
        }
    }

    /// Broadcast `message` to every matching subscriber (specific type
    /// match plus every wildcard subscriber).
    pub fn emit(&self, message: Message) {
        let listeners = self.listeners.lock().unwrap();
        let message_type = message.message_type();
        for listener in listeners.iter().flatten() {
            let matches = listener
                .message_types
                .iter()
                .any(|t| t == message_type || t == WILDCARD);
            if matches {
                let _ = listener.sender.try_send(message.clone());
            }
        }
    }

    pub fn emit_event(&self, message_type: impl Into<String>, data: Json) {
        self.emit(Message::Event {
            message_type: message_type.into(),
            data,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscriber_receives_only_matching_message_types() {
        let bus = EventBus::new();
        let sub_a = bus.subscribe("a", vec!["graph_merged".to_owned()]);
        let sub_b = bus.subscribe("b", vec!["other".to_owned()]);
        bus.emit_event("graph_merged", json!({"graph": "aws"}));

        let received = sub_a.receiver.recv_timeout(std::time::Duration::from_millis(100)).unwrap();
        assert_eq!(received.message_type(), "graph_merged");
        assert!(sub_b.receiver.try_recv().is_err());
    }

    #[test]
    fn wildcard_subscriber_receives_every_message_type() {
        let bus = EventBus::new();
        let sub = bus.subscribe("watcher", vec!["*".to_owned()]);
        bus.emit_event("anything", json!(null));
        assert!(sub.receiver.recv_timeout(std::time::Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn dropping_subscription_stops_further_delivery() {
        let bus = EventBus::new();
        let sub = bus.subscribe("temp", vec!["*".to_owned()]);
        drop(sub);
        bus.emit_event("anything", json!(null));
        let listeners = bus.listeners.lock().unwrap();
        assert!(listeners.iter().all(|l| l.is_none()));
    }
}

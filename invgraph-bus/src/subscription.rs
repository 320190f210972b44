//! Subscriber persistence: which event types a subscriber cares about, and
//! whether the bus should wait for its acknowledgement before a task step
//! is considered complete. Grounded on `EventBus.subscribe`'s bookkeeping
//! in `original_source/keepercore/core/event_bus.py`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// How a single event type is handled for one subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub timeout: Duration,
    pub wait_for_completion: bool,
}

impl SubscriptionSpec {
    pub fn new(timeout: Duration, wait_for_completion: bool) -> Self {
        SubscriptionSpec { timeout, wait_for_completion }
    }
}

/// A persisted subscriber: an id plus a map of event type to how that type
/// is delivered to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub subscriptions: HashMap<String, SubscriptionSpec>,
}

impl Subscriber {
    pub fn new(id: impl Into<String>) -> Self {
        Subscriber {
            id: id.into(),
            subscriptions: HashMap::new(),
        }
    }
}

#[derive(Debug, Fail)]
pub enum SubscriptionError {
    #[fail(display = "unknown subscriber: {}", _0)]
    NotFound(String),
}

/// In-memory subscriber registry. A single `RwLock` gives a
/// single-writer-per-component concurrency model.
pub struct SubscriptionHandler {
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl SubscriptionHandler {
    pub fn new() -> Self {
        SubscriptionHandler {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn list_all(&self) -> Vec<Subscriber> {
        self.subscribers.read().unwrap().values().cloned().collect()
    }

    pub fn list_for_event_type(&self, event_type: &str) -> Vec<Subscriber> {
        self.subscribers
            .read()
            .unwrap()
            .values()
            .filter(|s| s.subscriptions.contains_key(event_type))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Subscriber> {
        self.subscribers.read().unwrap().get(id).cloned()
    }

    pub fn add_subscription(&self, id: &str, event_type: impl Into<String>, spec: SubscriptionSpec) -> Subscriber {
        let mut subscribers = self.subscribers.write().unwrap();
        let subscriber = subscribers.entry(id.to_owned()).or_insert_with(|| Subscriber::new(id));
        subscriber.subscriptions.insert(event_type.into(), spec);
        subscriber.clone()
    }

    pub fn remove_subscription(&self, id: &str, event_type: &str) -> Result<Subscriber, SubscriptionError> {
        let mut subscribers = self.subscribers.write().unwrap();
        let subscriber = subscribers
            .get_mut(id)
            .ok_or_else(|| SubscriptionError::NotFound(id.to_owned()))?;
        subscriber.subscriptions.remove(event_type);
        Ok(subscriber.clone())
    }

    /// Replace a subscriber's entire subscription set.
    pub fn update_all(&self, id: &str, subscriptions: HashMap<String, SubscriptionSpec>) -> Subscriber {
        let mut subscribers = self.subscribers.write().unwrap();
        let subscriber = subscribers.entry(id.to_owned()).or_insert_with(|| Subscriber::new(id));
        subscriber.subscriptions = subscriptions;
        subscriber.clone()
    }

    pub fn remove_subscriber(&self, id: &str) -> Result<(), SubscriptionError> {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.remove(id).ok_or_else(|| SubscriptionError::NotFound(id.to_owned()))?;
        Ok(())
    }
}

impl Default for SubscriptionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_subscription_creates_subscriber_on_first_call() {
        let handler = SubscriptionHandler::new();
        let subscriber = handler.add_subscription("worker-1", "graph_merged", SubscriptionSpec::new(Duration::from_secs(30), true));
        assert_eq!(subscriber.id, "worker-1");
        assert!(subscriber.subscriptions.contains_key("graph_merged"));
    }

    #[test]
    fn remove_subscription_on_unknown_subscriber_errors() {
        let handler = SubscriptionHandler::new();
        let err = handler.remove_subscription("nope", "graph_merged").unwrap_err();
        assert!(matches!(err, SubscriptionError::NotFound(_)));
    }

    #[test]
    fn list_for_event_type_filters_by_subscription() {
        let handler = SubscriptionHandler::new();
        handler.add_subscription("a", "graph_merged", SubscriptionSpec::new(Duration::from_secs(1), false));
        handler.add_subscription("b", "other", SubscriptionSpec::new(Duration::from_secs(1), false));
        let found = handler.list_for_event_type("graph_merged");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }
}

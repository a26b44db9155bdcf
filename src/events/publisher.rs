use serde_json::Value;
use tokio::sync::broadcast;

/// Lifecycle notification fired by the query layer
#[derive(Debug, Clone)]
pub struct ModelEvent {
    /// Event name, e.g. `retrieved` or `created`
    pub name: String,
    /// Model type name
    pub model: String,
    /// Primary key of the affected record, when known
    pub key: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Event names fired by the query layer
pub mod names {
    pub const RETRIEVED: &str = "retrieved";
    pub const CREATED: &str = "created";
}

/// Broadcast publisher for model lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ModelEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a model event
    pub fn publish(&self, name: &str, model: &str, key: Value) {
        let event = ModelEvent {
            name: name.to_string(),
            model: model.to_string(),
            key,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

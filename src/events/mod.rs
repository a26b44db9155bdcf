pub mod publisher;

pub use publisher::{names, EventPublisher, ModelEvent};

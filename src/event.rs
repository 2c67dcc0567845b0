//! Immutable, reference-counted events (§3).

use std::sync::Arc;

use crate::properties::Properties;

struct EventInner {
    topic: String,
    properties: Properties,
}

/// An event published by `send` or `post`. Cheaply `Clone`-able: clones
/// share the same underlying topic/properties via `Arc`, so handing a copy
/// to the async queue (or to multiple worker threads) never duplicates the
/// payload.
#[derive(Clone)]
pub struct Event(Arc<EventInner>);

impl Event {
    #[must_use]
    pub fn new(topic: impl Into<String>, properties: Properties) -> Self {
        Self(Arc::new(EventInner { topic: topic.into(), properties }))
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.0.topic
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.0.properties
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("topic", &self.0.topic).finish_non_exhaustive()
    }
}

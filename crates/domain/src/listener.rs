//! Listener descriptor — what a subscriber hands to the event bus.

use std::fmt;
use std::sync::Arc;

use crate::event::Event;
use crate::filter::EventMatcher;
use crate::id::ListenerId;

/// Callback invoked for every delivered event.
pub type ListenerCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// A `(topic, predicate, callback)` triple.
///
/// The bus delivers an event to the listener when the event was published
/// under `topic` and the matcher accepts it. Cloning is cheap.
#[derive(Clone)]
pub struct EventListener {
    id: ListenerId,
    topic: String,
    name: Option<String>,
    matcher: Arc<dyn EventMatcher>,
    callback: ListenerCallback,
}

impl EventListener {
    pub fn new<M, F>(topic: impl Into<String>, matcher: M, callback: F) -> Self
    where
        M: EventMatcher + 'static,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::new(),
            topic: topic.into(),
            name: None,
            matcher: Arc::new(matcher),
            callback: Arc::new(callback),
        }
    }

    /// Attach a human-readable name for the callback, used in diagnostics.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this listener wants `event`.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        event.name == self.topic && self.matcher.matches(event)
    }

    /// Invoke the callback.
    pub fn notify(&self, event: &Event) {
        (self.callback)(event);
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("name", &self.name)
            .field("matcher", &self.matcher.to_string())
            .finish_non_exhaustive()
    }
}

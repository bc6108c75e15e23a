//! Event filters — declarative matchers used to build bus listeners.
//!
//! A filter never subscribes to anything itself. It decides whether an event
//! should be delivered, and [`EventMatcher::create_listener`] packages it with
//! a topic and a callback into an [`EventListener`] the bus can register.

use std::fmt;

use crate::event::{Event, EventKind};
use crate::listener::EventListener;
use crate::time::WatchDuration;

/// A predicate over events.
pub trait EventMatcher: fmt::Display + Send + Sync {
    /// Whether `event` should be delivered to a listener using this matcher.
    fn matches(&self, event: &Event) -> bool;

    /// Build a listener descriptor for events published under `topic`.
    fn create_listener<F>(self, topic: impl Into<String>, callback: F) -> EventListener
    where
        Self: Sized + 'static,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        EventListener::new(topic, self, callback)
    }
}

/// Matches events by kind and, optionally, by watch duration.
///
/// This is the filter a watch uses to scope listeners to exactly its own
/// output: `EventFilter::new(EventKind::NoChange).with_seconds(d)` only
/// accepts no-change events carrying duration `d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventFilter {
    kind: EventKind,
    seconds: Option<WatchDuration>,
}

impl EventFilter {
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            seconds: None,
        }
    }

    /// Only accept events carrying exactly this watch duration.
    #[must_use]
    pub fn with_seconds(mut self, seconds: WatchDuration) -> Self {
        self.seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[must_use]
    pub fn seconds(&self) -> Option<WatchDuration> {
        self.seconds
    }
}

impl EventMatcher for EventFilter {
    fn matches(&self, event: &Event) -> bool {
        event.kind().is_assignable_to(self.kind)
            && self
                .seconds
                .is_none_or(|expected| event.seconds() == Some(expected))
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seconds {
            Some(seconds) => write!(f, "EventFilter(type={}, seconds={seconds})", self.kind),
            None => write!(f, "EventFilter(type={})", self.kind),
        }
    }
}

/// Matches every value update, optionally only those carrying a given value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdateEventFilter {
    kind: EventKind,
    value: Option<serde_json::Value>,
}

impl Default for ValueUpdateEventFilter {
    fn default() -> Self {
        Self {
            kind: EventKind::ValueUpdate,
            value: None,
        }
    }
}

impl ValueUpdateEventFilter {
    /// Any value update, regardless of source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only updates of openHAB items.
    #[must_use]
    pub fn item_state() -> Self {
        Self {
            kind: EventKind::ItemState,
            value: None,
        }
    }

    /// Only updates received over MQTT.
    #[must_use]
    pub fn mqtt() -> Self {
        Self {
            kind: EventKind::MqttValueUpdate,
            value: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl EventMatcher for ValueUpdateEventFilter {
    fn matches(&self, event: &Event) -> bool {
        event.kind().is_assignable_to(self.kind)
            && self
                .value
                .as_ref()
                .is_none_or(|expected| event.value() == Some(expected))
    }
}

impl fmt::Display for ValueUpdateEventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}Filter(value={value})", self.kind),
            None => write!(f, "{}Filter()", self.kind),
        }
    }
}

/// Matches value changes, optionally constrained on the new and/or old value.
///
/// A change event whose old and new values are equal is never matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChangeEventFilter {
    kind: EventKind,
    value: Option<serde_json::Value>,
    old_value: Option<serde_json::Value>,
}

impl Default for ValueChangeEventFilter {
    fn default() -> Self {
        Self {
            kind: EventKind::ValueChange,
            value: None,
            old_value: None,
        }
    }
}

impl ValueChangeEventFilter {
    /// Any value change, regardless of source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only state changes of openHAB items.
    #[must_use]
    pub fn item_state_changed() -> Self {
        Self {
            kind: EventKind::ItemStateChanged,
            ..Self::default()
        }
    }

    /// Only value changes received over MQTT.
    #[must_use]
    pub fn mqtt() -> Self {
        Self {
            kind: EventKind::MqttValueChange,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_old_value(mut self, old_value: serde_json::Value) -> Self {
        self.old_value = Some(old_value);
        self
    }
}

impl EventMatcher for ValueChangeEventFilter {
    fn matches(&self, event: &Event) -> bool {
        if !event.kind().is_assignable_to(self.kind) {
            return false;
        }
        let (Some(value), Some(old_value)) = (event.value(), event.old_value()) else {
            return false;
        };
        if value == old_value {
            return false;
        }
        self.value.as_ref().is_none_or(|expected| value == expected)
            && self
                .old_value
                .as_ref()
                .is_none_or(|expected| old_value == expected)
    }
}

impl fmt::Display for ValueChangeEventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Filter(", self.kind)?;
        let mut sep = "";
        if let Some(value) = &self.value {
            write!(f, "value={value}")?;
            sep = ", ";
        }
        if let Some(old_value) = &self.old_value {
            write!(f, "{sep}old_value={old_value}")?;
        }
        f.write_str(")")
    }
}

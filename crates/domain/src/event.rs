//! Event — an immutable record of something that happened to a named entity.
//!
//! Value events come from the outside (an item or MQTT topic received a value);
//! [`NoUpdate`](EventPayload::NoUpdate) and [`NoChange`](EventPayload::NoChange)
//! events are synthesized by watches when an entity stayed quiet for too long.

use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::time::{Timestamp, WatchDuration, now};

/// Where a value event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Produced inside the rule engine (internal items).
    #[default]
    Internal,
    /// Mirrored from an openHAB item.
    Item,
    /// Received on an MQTT topic.
    Mqtt,
}

/// Runtime kind of an event.
///
/// Kinds form a small hierarchy: the source-specific update and change kinds
/// are assignable to the generic [`ValueUpdate`](Self::ValueUpdate) and
/// [`ValueChange`](Self::ValueChange) kinds. See [`EventKind::is_assignable_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ValueUpdate,
    ValueChange,
    ItemState,
    ItemStateChanged,
    MqttValueUpdate,
    MqttValueChange,
    NoUpdate,
    NoChange,
}

impl EventKind {
    /// The generic kind this kind specializes, if any.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::ItemState | Self::MqttValueUpdate => Some(Self::ValueUpdate),
            Self::ItemStateChanged | Self::MqttValueChange => Some(Self::ValueChange),
            Self::ValueUpdate | Self::ValueChange | Self::NoUpdate | Self::NoChange => None,
        }
    }

    /// Whether an event of kind `self` is an instance of `target`.
    #[must_use]
    pub fn is_assignable_to(self, target: Self) -> bool {
        self == target || self.parent() == Some(target)
    }

    /// Whether this kind belongs to the value-update family.
    #[must_use]
    pub fn is_update(self) -> bool {
        self.is_assignable_to(Self::ValueUpdate)
    }

    /// Whether this kind belongs to the value-change family.
    #[must_use]
    pub fn is_change(self) -> bool {
        self.is_assignable_to(Self::ValueChange)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ValueUpdate => "ValueUpdateEvent",
            Self::ValueChange => "ValueChangeEvent",
            Self::ItemState => "ItemStateEvent",
            Self::ItemStateChanged => "ItemStateChangedEvent",
            Self::MqttValueUpdate => "MqttValueUpdateEvent",
            Self::MqttValueChange => "MqttValueChangeEvent",
            Self::NoUpdate => "ItemNoUpdateEvent",
            Self::NoChange => "ItemNoChangeEvent",
        };
        f.write_str(name)
    }
}

/// Typed event content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The entity received a value (which may equal the previous one).
    ValueUpdate {
        source: ValueSource,
        value: serde_json::Value,
    },
    /// The entity received a value different from the previous one.
    ValueChange {
        source: ValueSource,
        value: serde_json::Value,
        old_value: serde_json::Value,
    },
    /// No value at all arrived for `seconds`.
    NoUpdate { seconds: WatchDuration },
    /// No *different* value arrived for `seconds`.
    NoChange { seconds: WatchDuration },
}

/// An event published on the bus under the entity's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Name of the entity the event is about; also the bus topic.
    pub name: String,
    pub payload: EventPayload,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with the current time and a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            payload,
            timestamp: now(),
        }
    }

    #[must_use]
    pub fn no_update(name: impl Into<String>, seconds: WatchDuration) -> Self {
        Self::new(name, EventPayload::NoUpdate { seconds })
    }

    #[must_use]
    pub fn no_change(name: impl Into<String>, seconds: WatchDuration) -> Self {
        Self::new(name, EventPayload::NoChange { seconds })
    }

    #[must_use]
    pub fn value_update(
        name: impl Into<String>,
        source: ValueSource,
        value: serde_json::Value,
    ) -> Self {
        Self::new(name, EventPayload::ValueUpdate { source, value })
    }

    #[must_use]
    pub fn value_change(
        name: impl Into<String>,
        source: ValueSource,
        value: serde_json::Value,
        old_value: serde_json::Value,
    ) -> Self {
        Self::new(
            name,
            EventPayload::ValueChange {
                source,
                value,
                old_value,
            },
        )
    }

    /// Runtime kind, derived from the payload and its source.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::ValueUpdate { source, .. } => match source {
                ValueSource::Internal => EventKind::ValueUpdate,
                ValueSource::Item => EventKind::ItemState,
                ValueSource::Mqtt => EventKind::MqttValueUpdate,
            },
            EventPayload::ValueChange { source, .. } => match source {
                ValueSource::Internal => EventKind::ValueChange,
                ValueSource::Item => EventKind::ItemStateChanged,
                ValueSource::Mqtt => EventKind::MqttValueChange,
            },
            EventPayload::NoUpdate { .. } => EventKind::NoUpdate,
            EventPayload::NoChange { .. } => EventKind::NoChange,
        }
    }

    /// Watch duration carried by no-update/no-change events.
    #[must_use]
    pub fn seconds(&self) -> Option<WatchDuration> {
        match &self.payload {
            EventPayload::NoUpdate { seconds } | EventPayload::NoChange { seconds } => {
                Some(*seconds)
            }
            EventPayload::ValueUpdate { .. } | EventPayload::ValueChange { .. } => None,
        }
    }

    /// New value carried by value events.
    #[must_use]
    pub fn value(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            EventPayload::ValueUpdate { value, .. } | EventPayload::ValueChange { value, .. } => {
                Some(value)
            }
            EventPayload::NoUpdate { .. } | EventPayload::NoChange { .. } => None,
        }
    }

    /// Previous value carried by change events.
    #[must_use]
    pub fn old_value(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            EventPayload::ValueChange { old_value, .. } => Some(old_value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.payload {
            EventPayload::ValueUpdate { value, .. } => {
                write!(f, "<{} name: {}, value: {value}>", self.kind(), self.name)
            }
            EventPayload::ValueChange {
                value, old_value, ..
            } => write!(
                f,
                "<{} name: {}, value: {value}, old_value: {old_value}>",
                self.kind(),
                self.name
            ),
            EventPayload::NoUpdate { seconds } | EventPayload::NoChange { seconds } => {
                write!(f, "<{} name: {}, seconds: {seconds}>", self.kind(), self.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> WatchDuration {
        WatchDuration::from_secs(s).unwrap()
    }

    #[test]
    fn should_derive_kind_from_payload_and_source() {
        let item = Event::value_update("Light", ValueSource::Item, serde_json::json!("ON"));
        assert_eq!(item.kind(), EventKind::ItemState);

        let mqtt = Event::value_change(
            "sensor/temp",
            ValueSource::Mqtt,
            serde_json::json!(21.5),
            serde_json::json!(21.0),
        );
        assert_eq!(mqtt.kind(), EventKind::MqttValueChange);

        assert_eq!(Event::no_change("Door", secs(3.0)).kind(), EventKind::NoChange);
    }

    #[test]
    fn should_treat_source_specific_kinds_as_generic_kinds() {
        assert!(EventKind::ItemState.is_assignable_to(EventKind::ValueUpdate));
        assert!(EventKind::MqttValueChange.is_assignable_to(EventKind::ValueChange));
        assert!(!EventKind::ItemState.is_assignable_to(EventKind::ValueChange));
        assert!(!EventKind::ValueUpdate.is_assignable_to(EventKind::ItemState));
    }

    #[test]
    fn should_keep_watch_kinds_outside_value_families() {
        assert!(!EventKind::NoUpdate.is_update());
        assert!(!EventKind::NoChange.is_change());
        assert!(!EventKind::NoUpdate.is_assignable_to(EventKind::NoChange));
    }

    #[test]
    fn should_expose_seconds_only_on_watch_events() {
        let ev = Event::no_update("TempSensor", secs(5.0));
        assert_eq!(ev.seconds(), Some(secs(5.0)));
        assert!(ev.value().is_none());

        let ev = Event::value_update("TempSensor", ValueSource::Internal, serde_json::json!(1));
        assert!(ev.seconds().is_none());
        assert_eq!(ev.value(), Some(&serde_json::json!(1)));
    }

    #[test]
    fn should_display_watch_event() {
        let ev = Event::no_update("TempSensor", secs(5.0));
        assert_eq!(ev.to_string(), "<ItemNoUpdateEvent name: TempSensor, seconds: 5s>");
    }

    #[test]
    fn should_serialize_payload_with_type_tag() {
        let ev = Event::no_change("Door", secs(3.0));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["payload"]["type"], "no_change");
        assert_eq!(json["payload"]["seconds"], 3.0);
    }
}

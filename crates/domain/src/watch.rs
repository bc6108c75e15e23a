//! Watch kinds — which notification a watch emits when it expires.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::{Event, EventKind};
use crate::filter::EventFilter;
use crate::time::WatchDuration;

/// The flavour of inactivity a watch detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    /// Fires if the entity receives no value at all.
    NoUpdate,
    /// Fires if the entity receives no value different from its current one.
    NoChange,
}

impl WatchKind {
    /// Kind of the event published on expiry.
    #[must_use]
    pub fn event_kind(self) -> EventKind {
        match self {
            Self::NoUpdate => EventKind::NoUpdate,
            Self::NoChange => EventKind::NoChange,
        }
    }

    /// Build the expiry event for entity `name`.
    #[must_use]
    pub fn build_event(self, name: &str, seconds: WatchDuration) -> Event {
        match self {
            Self::NoUpdate => Event::no_update(name, seconds),
            Self::NoChange => Event::no_change(name, seconds),
        }
    }

    /// Filter accepting exactly the events a watch of this kind and duration emits.
    #[must_use]
    pub fn filter(self, seconds: WatchDuration) -> EventFilter {
        EventFilter::new(self.event_kind()).with_seconds(seconds)
    }
}

/// Check the item name a watch is bound to.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyName`] for empty or whitespace-only names.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(())
    }
}

impl std::fmt::Display for WatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoUpdate => f.write_str("ItemNoUpdateWatch"),
            Self::NoChange => f.write_str("ItemNoChangeWatch"),
        }
    }
}

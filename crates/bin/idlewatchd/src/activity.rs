//! Activity source — turns `<name> <value>` lines into value events and
//! watch reschedules.
//!
//! Every value is an update: it restarts the item's no-update watches. A
//! value different from the last one seen (or the first value ever seen) is
//! also a change and restarts the item's no-change watches.

use std::collections::HashMap;
use std::sync::Arc;

use idlewatch_app::ports::EventPublisher;
use idlewatch_app::watch::Watch;
use idlewatch_domain::error::WatchError;
use idlewatch_domain::event::{Event, ValueSource};
use idlewatch_domain::watch::WatchKind;
use serde_json::Value;

/// Split an input line into item name and raw value.
///
/// Blank lines and lines starting with `#` are ignored.
#[must_use]
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (name, value) = line.split_once(char::is_whitespace)?;
    Some((name, value.trim()))
}

/// Interpret a raw value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// What a single recorded value did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Activity {
    /// Whether the value differed from the previous one.
    pub changed: bool,
    /// Number of watches restarted.
    pub rescheduled: usize,
}

/// Tracks the last value of every item and restarts its watches.
pub struct ActivityTracker<P> {
    publisher: Arc<P>,
    watches: HashMap<String, Vec<Arc<Watch>>>,
    last_values: HashMap<String, Value>,
}

impl<P> ActivityTracker<P>
where
    P: EventPublisher + Send + Sync,
{
    #[must_use]
    pub fn new(publisher: Arc<P>) -> Self {
        Self {
            publisher,
            watches: HashMap::new(),
            last_values: HashMap::new(),
        }
    }

    /// Drive `watch` from the values recorded for its item.
    pub fn track(&mut self, watch: Arc<Watch>) {
        self.watches
            .entry(watch.name().to_string())
            .or_default()
            .push(watch);
    }

    /// Record a new value for `name`.
    ///
    /// Publishes an item state event (and a state-changed event when the
    /// value differs), then restarts the affected watches.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails or the scheduler has stopped.
    pub async fn record(&mut self, name: &str, raw: &str) -> Result<Activity, WatchError> {
        let value = parse_value(raw);
        let previous = self.last_values.insert(name.to_string(), value.clone());
        let changed = previous.as_ref() != Some(&value);

        self.publisher
            .publish(Event::value_update(name, ValueSource::Item, value.clone()))
            .await?;
        if changed {
            let old_value = previous.unwrap_or(Value::Null);
            self.publisher
                .publish(Event::value_change(name, ValueSource::Item, value, old_value))
                .await?;
        }

        let mut rescheduled = 0;
        for watch in self.watches.get(name).into_iter().flatten() {
            if watch.kind() == WatchKind::NoUpdate || changed {
                watch.reschedule()?;
                rescheduled += 1;
            }
        }
        Ok(Activity {
            changed,
            rescheduled,
        })
    }
}

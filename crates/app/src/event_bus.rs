//! In-process event bus backed by a tokio broadcast channel plus a set of
//! filtered listeners.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::broadcast;

use idlewatch_domain::error::PublishError;
use idlewatch_domain::event::Event;
use idlewatch_domain::id::ListenerId;
use idlewatch_domain::listener::EventListener;

use crate::ports::{CancelFuture, Cancellable, EventPublisher, EventSubscriber};

type ListenerSet = RwLock<Vec<EventListener>>;

/// In-process event bus.
///
/// Every published event goes to the raw [`broadcast`] stream (see
/// [`subscribe`](Self::subscribe)) and to each registered [`EventListener`]
/// whose topic and matcher accept it. Listener callbacks run synchronously on
/// the publishing task.
///
/// Publishing succeeds even when there are no subscribers (the event is
/// simply dropped).
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
    listeners: Arc<ListenerSet>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Subscribe to every event on this bus, unfiltered.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of registered filtered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn matching_listeners(&self, event: &Event) -> Vec<EventListener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|listener| listener.accepts(event))
            .cloned()
            .collect()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), PublishError>> + Send {
        // Snapshot first so callbacks may add or remove listeners.
        for listener in self.matching_listeners(&event) {
            tracing::trace!(
                topic = %event.name,
                listener = listener.name().unwrap_or("<anonymous>"),
                "delivering event"
            );
            listener.notify(&event);
        }
        // Fails only without raw subscribers.
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}

impl EventSubscriber for InProcessEventBus {
    type Handle = ListenerHandle;

    fn add_listener(&self, listener: EventListener) -> ListenerHandle {
        let id = listener.id();
        tracing::debug!(
            %id,
            topic = listener.topic(),
            name = listener.name().unwrap_or("<anonymous>"),
            "listener added"
        );
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

/// Disposable registration of a listener on an [`InProcessEventBus`].
///
/// Cancelling removes the listener; cancelling again (or after the bus is
/// gone) does nothing.
#[derive(Debug)]
pub struct ListenerHandle {
    id: ListenerId,
    listeners: Weak<ListenerSet>,
}

impl ListenerHandle {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Returns `true` if it was still registered.
    pub fn remove(&self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|listener| listener.id() != self.id);
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(id = %self.id, "listener removed");
        }
        removed
    }
}

impl Cancellable for ListenerHandle {
    fn cancel(&self) -> CancelFuture<'_> {
        self.remove();
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use idlewatch_domain::event::{EventKind, ValueSource};
    use idlewatch_domain::filter::{EventFilter, EventMatcher, ValueUpdateEventFilter};
    use idlewatch_domain::time::WatchDuration;

    fn secs(s: f64) -> WatchDuration {
        WatchDuration::from_secs(s).unwrap()
    }

    fn recording_listener(
        topic: &str,
        matcher: impl EventMatcher + 'static,
    ) -> (EventListener, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = matcher.create_listener(topic, move |event: &Event| {
            sink.lock().unwrap().push(event.clone());
        });
        (listener, seen)
    }

    #[tokio::test]
    async fn should_deliver_event_to_raw_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();

        let event = Event::no_update("TempSensor", secs(5.0));
        let event_id = event.id;
        bus.publish(event).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event_id);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        let result = bus.publish(Event::no_change("Door", secs(3.0))).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_deliver_only_to_matching_listener() {
        let bus = InProcessEventBus::new(16);
        let (no_change, no_change_seen) = recording_listener(
            "Door",
            EventFilter::new(EventKind::NoChange).with_seconds(secs(10.0)),
        );
        let (no_update, no_update_seen) =
            recording_listener("Door", EventFilter::new(EventKind::NoUpdate));
        let _h1 = bus.add_listener(no_change);
        let _h2 = bus.add_listener(no_update);

        bus.publish(Event::no_change("Door", secs(10.0))).await.unwrap();
        bus.publish(Event::no_change("Door", secs(5.0))).await.unwrap();
        bus.publish(Event::no_change("Window", secs(10.0))).await.unwrap();

        assert_eq!(no_change_seen.lock().unwrap().len(), 1);
        assert!(no_update_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_stop_delivering_after_handle_cancelled() {
        let bus = InProcessEventBus::new(16);
        let (listener, seen) = recording_listener("Light", ValueUpdateEventFilter::item_state());
        let handle = bus.add_listener(listener);
        assert_eq!(bus.listener_count(), 1);

        handle.cancel().await.unwrap();
        handle.cancel().await.unwrap();
        assert_eq!(bus.listener_count(), 0);

        bus.publish(Event::value_update(
            "Light",
            ValueSource::Item,
            serde_json::json!("ON"),
        ))
        .await
        .unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn should_report_false_when_removing_twice() {
        let bus = InProcessEventBus::new(4);
        let handle =
            bus.add_listener(EventFilter::new(EventKind::NoUpdate).create_listener("X", |_| {}));
        assert!(handle.remove());
        assert!(!handle.remove());
    }

    #[test]
    fn should_ignore_removal_after_bus_dropped() {
        let bus = InProcessEventBus::new(4);
        let handle =
            bus.add_listener(EventFilter::new(EventKind::NoUpdate).create_listener("X", |_| {}));
        drop(bus);
        assert!(!handle.remove());
    }
}

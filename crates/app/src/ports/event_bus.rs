//! Event bus port — publish/subscribe for domain events.

use std::future::Future;
use std::sync::Arc;

use idlewatch_domain::error::PublishError;
use idlewatch_domain::event::Event;
use idlewatch_domain::listener::EventListener;

use super::Cancellable;

/// Publishes events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), PublishError>> + Send {
        (**self).publish(event)
    }
}

/// Registers listener descriptors built from event filters.
pub trait EventSubscriber {
    /// Handle returned for each registration; cancelling it unregisters the listener.
    type Handle: Cancellable + 'static;

    /// Register `listener`; it receives every later event it accepts.
    fn add_listener(&self, listener: EventListener) -> Self::Handle;
}

//! Port definitions — traits the subsystem's collaborators implement.
//!
//! The watch subsystem only ever *publishes*; subscribers and owners are
//! reached through these traits so either side can be swapped out.

pub mod event_bus;
pub mod lifecycle;

pub use event_bus::{EventPublisher, EventSubscriber};
pub use lifecycle::{CancelFuture, Cancellable};

//! Lifecycle port — things an owner cancels when it goes away.

use std::future::Future;
use std::pin::Pin;

use idlewatch_domain::error::LifecycleError;

/// Future returned by [`Cancellable::cancel`].
pub type CancelFuture<'a> = Pin<Box<dyn Future<Output = Result<(), LifecycleError>> + Send + 'a>>;

/// Capability to be cancelled by an owner.
///
/// Owners keep a set of `Arc<dyn Cancellable>` and call [`cancel`](Self::cancel)
/// on each when they unload. Implementations must tolerate redundant calls:
/// a second cancel is a no-op, never an error.
pub trait Cancellable: Send + Sync {
    fn cancel(&self) -> CancelFuture<'_>;
}

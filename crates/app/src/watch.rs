//! Watch — a named inactivity monitor built on one deadline timer.
//!
//! A watch is armed on creation. When its timer expires it builds the event
//! for its [`WatchKind`] and publishes it under the entity's name. Whoever
//! observes entity activity keeps the watch quiet by calling
//! [`Watch::reschedule`]; this module does not decide what counts as activity.

use std::fmt;
use std::sync::Arc;

use idlewatch_domain::error::{LifecycleError, ValidationError, WatchError};
use idlewatch_domain::event::Event;
use idlewatch_domain::filter::{EventFilter, EventMatcher};
use idlewatch_domain::time::WatchDuration;
use idlewatch_domain::watch::{WatchKind, validate_name};

use crate::ports::{CancelFuture, Cancellable, EventPublisher, EventSubscriber};
use crate::rule_context::RuleContext;
use crate::scheduler::SchedulerHandle;
use crate::timer::{CancelOutcome, DeadlineTimer};

/// Inactivity monitor for one entity.
#[derive(Debug)]
pub struct Watch {
    name: String,
    seconds: WatchDuration,
    kind: WatchKind,
    timer: DeadlineTimer,
}

impl Watch {
    /// Create a watch and arm it for `seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] for a blank name or
    /// [`ValidationError::InvalidDuration`] for a bad duration, or a lifecycle
    /// error if the scheduler has stopped.
    pub fn create<P>(
        scheduler: &SchedulerHandle,
        publisher: P,
        name: impl Into<String>,
        seconds: f64,
        kind: WatchKind,
    ) -> Result<Self, WatchError>
    where
        P: EventPublisher + Send + Sync + 'static,
    {
        let name = name.into();
        validate_name(&name)?;
        let seconds = WatchDuration::from_secs(seconds)?;

        let publisher = Arc::new(publisher);
        let topic = name.clone();
        let timer = scheduler.timer(move || {
            let publisher = Arc::clone(&publisher);
            let event = kind.build_event(&topic, seconds);
            async move {
                tracing::debug!(name = %event.name, %kind, %seconds, "watch expired");
                publisher.publish(event).await.map_err(WatchError::from)
            }
        })?;
        timer.arm_after(seconds.as_duration())?;
        tracing::trace!(%name, %kind, %seconds, "watch armed");

        Ok(Self {
            name,
            seconds,
            kind,
            timer,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn seconds(&self) -> WatchDuration {
        self.seconds
    }

    #[must_use]
    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    /// Underlying timer, for callers that need its state.
    #[must_use]
    pub fn timer(&self) -> &DeadlineTimer {
        &self.timer
    }

    /// Filter matching exactly the events this watch publishes.
    #[must_use]
    pub fn event_filter(&self) -> EventFilter {
        self.kind.filter(self.seconds)
    }

    /// Restart the full duration. Call this whenever qualifying activity happens.
    ///
    /// A watch that already fired is armed for a new cycle; a cancelled watch
    /// stays cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SchedulerClosed`] if the scheduler has stopped.
    pub fn reschedule(&self) -> Result<(), LifecycleError> {
        self.timer.arm_after(self.seconds.as_duration())
    }

    /// Cancel the watch. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the scheduler could not be reached.
    pub async fn cancel(&self) -> Result<(), LifecycleError> {
        let outcome = self.timer.cancel().await?;
        self.log_cancel(outcome);
        Ok(())
    }

    /// Cancel from a plain thread; see [`DeadlineTimer::cancel_blocking`].
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the scheduler could not be reached.
    pub fn cancel_blocking(&self) -> Result<(), LifecycleError> {
        let outcome = self.timer.cancel_blocking()?;
        self.log_cancel(outcome);
        Ok(())
    }

    /// Listen to (only) the events emitted by this watch.
    ///
    /// The listener is registered through `ctx`, so it goes away when the
    /// owner unloads. Listening neither re-arms nor extends the watch.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OwnerUnloaded`] if `ctx` has been unloaded.
    pub fn listen_event<B, F>(
        &self,
        ctx: &RuleContext<B>,
        label: &str,
        callback: F,
    ) -> Result<Arc<B::Handle>, LifecycleError>
    where
        B: EventPublisher + EventSubscriber + Send + Sync + 'static,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener = self
            .event_filter()
            .create_listener(self.name.as_str(), callback)
            .named(ctx.callback_name(label));
        ctx.add_event_listener(listener)
    }

    fn log_cancel(&self, outcome: CancelOutcome) {
        if outcome == CancelOutcome::Cancelled {
            tracing::debug!(
                name = %self.name,
                kind = %self.kind,
                seconds = %self.seconds,
                "watch canceled"
            );
        }
    }
}

impl fmt::Display for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) for {}", self.kind, self.seconds, self.name)
    }
}

impl Cancellable for Watch {
    fn cancel(&self) -> CancelFuture<'_> {
        Box::pin(Watch::cancel(self))
    }
}

//! Rule context — ties watches and listeners to the lifetime of a rule.
//!
//! Everything a rule creates through its context lands in the context's
//! cancellation set. [`RuleContext::unload`] drains that set and cancels each
//! entry exactly once, whether or not it already fired or was cancelled by
//! user code in the meantime.

use std::sync::{Arc, Mutex, PoisonError};

use idlewatch_domain::error::{LifecycleError, WatchError};
use idlewatch_domain::listener::EventListener;
use idlewatch_domain::watch::WatchKind;

use crate::ports::{Cancellable, EventPublisher, EventSubscriber};
use crate::scheduler::SchedulerHandle;
use crate::watch::Watch;

/// Owner of watches and listeners created on behalf of one rule.
pub struct RuleContext<B> {
    name: String,
    scheduler: SchedulerHandle,
    bus: Arc<B>,
    /// `None` once the rule has been unloaded.
    cancellables: Mutex<Option<Vec<Arc<dyn Cancellable>>>>,
}

impl<B> RuleContext<B>
where
    B: EventPublisher + EventSubscriber + Send + Sync + 'static,
{
    /// Create a context for the rule called `name`.
    pub fn new(name: impl Into<String>, scheduler: SchedulerHandle, bus: Arc<B>) -> Self {
        Self {
            name: name.into(),
            scheduler,
            bus,
            cancellables: Mutex::new(Some(Vec::new())),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of a callback belonging to this rule, used to label
    /// listeners in diagnostics.
    #[must_use]
    pub fn callback_name(&self, label: &str) -> String {
        format!("{}.{label}", self.name)
    }

    /// Whether [`unload`](Self::unload) has run.
    #[must_use]
    pub fn is_unloaded(&self) -> bool {
        self.cancellables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of objects that will be cancelled on unload.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.cancellables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }

    /// Cancel `obj` when this rule unloads.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OwnerUnloaded`] if the rule is already gone.
    pub fn register_for_cancellation(
        &self,
        obj: Arc<dyn Cancellable>,
    ) -> Result<(), LifecycleError> {
        let mut guard = self
            .cancellables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(set) => {
                set.push(obj);
                Ok(())
            }
            None => Err(self.unloaded()),
        }
    }

    /// Register `listener` on the bus for as long as this rule lives.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OwnerUnloaded`] if the rule is already gone;
    /// the listener is not registered in that case.
    pub fn add_event_listener(
        &self,
        listener: EventListener,
    ) -> Result<Arc<B::Handle>, LifecycleError> {
        let mut guard = self
            .cancellables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(set) = guard.as_mut() else {
            return Err(self.unloaded());
        };
        let handle = Arc::new(self.bus.add_listener(listener));
        set.push(Arc::clone(&handle) as Arc<dyn Cancellable>);
        Ok(handle)
    }

    /// Create a watch bound to this rule.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad arguments, or a lifecycle error if
    /// the rule is unloaded or the scheduler has stopped.
    #[tracing::instrument(skip(self), fields(rule = %self.name))]
    pub fn watch(
        &self,
        name: &str,
        seconds: f64,
        kind: WatchKind,
    ) -> Result<Arc<Watch>, WatchError> {
        if self.is_unloaded() {
            return Err(self.unloaded().into());
        }
        let watch = Arc::new(Watch::create(
            &self.scheduler,
            Arc::clone(&self.bus),
            name,
            seconds,
            kind,
        )?);
        // If unload raced us, dropping the watch releases its timer.
        self.register_for_cancellation(Arc::clone(&watch) as Arc<dyn Cancellable>)?;
        Ok(watch)
    }

    /// Watch `name` for the absence of any update.
    ///
    /// # Errors
    ///
    /// See [`watch`](Self::watch).
    pub fn watch_update(&self, name: &str, seconds: f64) -> Result<Arc<Watch>, WatchError> {
        self.watch(name, seconds, WatchKind::NoUpdate)
    }

    /// Watch `name` for the absence of a value change.
    ///
    /// # Errors
    ///
    /// See [`watch`](Self::watch).
    pub fn watch_change(&self, name: &str, seconds: f64) -> Result<Arc<Watch>, WatchError> {
        self.watch(name, seconds, WatchKind::NoChange)
    }

    /// Tear the rule down: cancel every registered object exactly once.
    ///
    /// Every object is cancelled even if some fail. Calling `unload` again
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first [`LifecycleError`] encountered.
    #[tracing::instrument(skip(self), fields(rule = %self.name))]
    pub async fn unload(&self) -> Result<(), LifecycleError> {
        let taken = self
            .cancellables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(set) = taken else {
            return Ok(());
        };

        let total = set.len();
        let mut first_error = None;
        for obj in set {
            if let Err(err) = obj.cancel().await {
                tracing::warn!(%err, "failed to cancel object while unloading rule");
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!(cancelled = total, "rule unloaded");
        first_error.map_or(Ok(()), Err)
    }

    fn unloaded(&self) -> LifecycleError {
        LifecycleError::OwnerUnloaded {
            owner: self.name.clone(),
        }
    }
}

//! Common error types used across the workspace.
//!
//! Each concern has its own typed error; [`WatchError`] aggregates them via
//! `#[from]` so `?` works across layer boundaries.

/// Top-level error for watch, timer and listener operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("lifecycle error")]
    Lifecycle(#[from] LifecycleError),

    #[error("publish error")]
    Publish(#[from] PublishError),
}

/// Arguments rejected synchronously, before anything is scheduled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("watch duration must be a finite number of seconds greater than zero, got {seconds}")]
    InvalidDuration { seconds: f64 },

    #[error("delay must be a finite, non-negative number of seconds, got {seconds}")]
    InvalidDelay { seconds: f64 },
}

/// Failures bridging a request onto the scheduler that owns the timers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The scheduler task has shut down (or never started).
    #[error("scheduler is not running")]
    SchedulerClosed,

    /// The scheduler did not acknowledge a request in time.
    #[error("scheduler did not acknowledge within {timeout_ms}ms")]
    AckTimeout { timeout_ms: u64 },

    /// The owner has already been unloaded and accepts no new registrations.
    #[error("owner {owner} has already been unloaded")]
    OwnerUnloaded { owner: String },
}

/// Delivering an event to the bus failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to publish event on topic {topic}")]
pub struct PublishError {
    pub topic: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

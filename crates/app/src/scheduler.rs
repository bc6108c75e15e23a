//! Scheduler — the single task that owns every deadline timer.
//!
//! Timer handles ([`DeadlineTimer`]) never touch timer state. They send
//! [`Command`]s over an unbounded channel; the scheduler applies them in
//! order, sleeps until the earliest armed deadline and dispatches expiry
//! callbacks. Because commands are drained before due deadlines on every
//! turn, a cancel that reached the scheduler before an expiry was dispatched
//! always suppresses that expiry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use idlewatch_domain::error::{LifecycleError, WatchError};
use idlewatch_domain::id::TimerId;

use crate::timer::{CancelOutcome, DeadlineTimer, ExpiryCallback, ExpiryFuture, TimerState};

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// How long an async `cancel()` waits for the scheduler's acknowledgment.
    pub ack_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
        }
    }
}

/// A failed expiry callback, reported on the scheduler's error sink.
#[derive(Debug)]
pub enum ExpiryFailure {
    /// The callback returned an error (e.g. publishing failed).
    Failed { timer: TimerId, error: WatchError },
    /// The callback panicked.
    Panicked { timer: TimerId },
}

/// Where a cancel acknowledgment goes: an async waiter or a blocked thread.
#[derive(Debug)]
pub(crate) enum Ack {
    Async(oneshot::Sender<CancelOutcome>),
    Blocking(crossbeam_channel::Sender<CancelOutcome>),
}

impl Ack {
    fn send(self, outcome: CancelOutcome) {
        // The requester may have timed out and gone away; nothing to do then.
        match self {
            Self::Async(tx) => {
                let _ = tx.send(outcome);
            }
            Self::Blocking(tx) => {
                let _ = tx.send(outcome);
            }
        }
    }
}

pub(crate) enum Command {
    Register {
        id: TimerId,
        callback: ExpiryCallback,
    },
    Arm {
        id: TimerId,
        delay: Duration,
    },
    Cancel {
        id: TimerId,
        ack: Ack,
    },
    Query {
        id: TimerId,
        reply: oneshot::Sender<Option<TimerState>>,
    },
    Release {
        id: TimerId,
    },
    Shutdown,
}

/// Cloneable, thread-safe entry point to a running [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    ack_timeout: Duration,
}

impl SchedulerHandle {
    /// Create an idle timer that runs `callback` each time it expires.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SchedulerClosed`] if the scheduler has stopped.
    pub fn timer<F, Fut>(&self, callback: F) -> Result<DeadlineTimer, LifecycleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WatchError>> + Send + 'static,
    {
        let callback: ExpiryCallback = Arc::new(move || -> ExpiryFuture { Box::pin(callback()) });
        let id = TimerId::new();
        self.send(Command::Register { id, callback })?;
        Ok(DeadlineTimer::new(id, self.clone()))
    }

    /// Create a timer and arm it to fire once after `delay_secs` seconds.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a negative or non-finite delay, or a
    /// lifecycle error if the scheduler has stopped.
    pub fn arm<F, Fut>(&self, delay_secs: f64, callback: F) -> Result<DeadlineTimer, WatchError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WatchError>> + Send + 'static,
    {
        let delay = idlewatch_domain::time::delay_from_secs(delay_secs)?;
        let timer = self.timer(callback)?;
        timer.arm_after(delay)?;
        Ok(timer)
    }

    /// Ask the scheduler to stop. Pending timers never fire; callbacks already
    /// running are awaited before the scheduler task ends.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Whether the scheduler task has stopped accepting commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub(crate) fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), LifecycleError> {
        self.commands
            .send(command)
            .map_err(|_| LifecycleError::SchedulerClosed)
    }
}

struct Slot {
    callback: ExpiryCallback,
    state: TimerState,
    deadline: Option<Instant>,
    /// An expiry callback of this timer is still running.
    in_flight: bool,
}

impl Slot {
    fn reported_state(&self) -> TimerState {
        if self.in_flight && self.state == TimerState::Fired {
            TimerState::Firing
        } else {
            self.state
        }
    }
}

struct Completion {
    timer: TimerId,
    result: Option<Result<(), WatchError>>,
}

/// Reports completion when dropped, so a panicking callback is still accounted for.
struct Dispatch {
    timer: TimerId,
    done: mpsc::UnboundedSender<Completion>,
    result: Option<Result<(), WatchError>>,
}

impl Dispatch {
    fn finish(mut self, result: Result<(), WatchError>) {
        self.result = Some(result);
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        let _ = self.done.send(Completion {
            timer: self.timer,
            result: self.result.take(),
        });
    }
}

/// The task that owns all timer state.
pub struct Scheduler {
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    slots: HashMap<TimerId, Slot>,
    dispatched: usize,
    errors: Option<mpsc::UnboundedSender<ExpiryFailure>>,
}

impl Scheduler {
    /// Create a scheduler and the handle used to reach it.
    ///
    /// Nothing runs until [`start`](Self::start) (or [`run`](Self::run)) is called.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> (Self, SchedulerHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let scheduler = Self {
            commands,
            completions_tx,
            completions,
            slots: HashMap::new(),
            dispatched: 0,
            errors: None,
        };
        let handle = SchedulerHandle {
            commands: commands_tx,
            ack_timeout: config.ack_timeout,
        };
        (scheduler, handle)
    }

    /// Report failed expiry callbacks on `sink` instead of only logging them.
    #[must_use]
    pub fn with_error_sink(mut self, sink: mpsc::UnboundedSender<ExpiryFailure>) -> Self {
        self.errors = Some(sink);
        self
    }

    /// Spawn the scheduler loop on the current tokio runtime.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the scheduler loop until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("scheduler started");
        loop {
            let next = self.next_deadline();
            let wait = async move {
                match next {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                Some(done) = self.completions.recv() => self.complete(done),
                () = wait => self.fire_due(Instant::now()),
            }
        }
        self.commands.close();
        self.drain().await;
        tracing::debug!("scheduler stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter(|slot| slot.state == TimerState::Armed && !slot.in_flight)
            .filter_map(|slot| slot.deadline)
            .min()
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register { id, callback } => {
                self.slots.insert(
                    id,
                    Slot {
                        callback,
                        state: TimerState::Idle,
                        deadline: None,
                        in_flight: false,
                    },
                );
            }
            Command::Arm { id, delay } => self.arm(id, delay),
            Command::Cancel { id, ack } => ack.send(self.cancel(id)),
            Command::Query { id, reply } => {
                let _ = reply.send(self.slots.get(&id).map(Slot::reported_state));
            }
            Command::Release { id } => {
                if let Some(slot) = self.slots.remove(&id) {
                    tracing::trace!(timer = %id, state = ?slot.reported_state(), "timer released");
                }
            }
            Command::Shutdown => {}
        }
    }

    fn arm(&mut self, id: TimerId, delay: Duration) {
        let Some(slot) = self.slots.get_mut(&id) else {
            tracing::warn!(timer = %id, "arm requested for unknown timer");
            return;
        };
        if slot.state == TimerState::Cancelled {
            tracing::debug!(timer = %id, "ignoring arm of cancelled timer");
            return;
        }
        slot.state = TimerState::Armed;
        // A delay too large to represent never expires.
        slot.deadline = Instant::now().checked_add(delay);
        tracing::trace!(timer = %id, ?delay, "timer armed");
    }

    fn cancel(&mut self, id: TimerId) -> CancelOutcome {
        let Some(slot) = self.slots.get_mut(&id) else {
            return CancelOutcome::AlreadyCancelled;
        };
        let outcome = match slot.reported_state() {
            TimerState::Idle | TimerState::Armed => CancelOutcome::Cancelled,
            TimerState::Firing => CancelOutcome::AlreadyFiring,
            TimerState::Fired => CancelOutcome::AlreadyFired,
            TimerState::Cancelled => CancelOutcome::AlreadyCancelled,
        };
        slot.state = TimerState::Cancelled;
        slot.deadline = None;
        tracing::trace!(timer = %id, ?outcome, "timer cancel applied");
        outcome
    }

    fn fire_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, TimerId)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state == TimerState::Armed && !slot.in_flight)
            .filter_map(|(id, slot)| slot.deadline.map(|deadline| (deadline, *id)))
            .filter(|(deadline, _)| *deadline <= now)
            .collect();
        // Same-turn expiries publish in deadline order.
        due.sort_unstable_by_key(|(deadline, _)| *deadline);

        for (_, id) in due {
            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            slot.state = TimerState::Fired;
            slot.deadline = None;
            slot.in_flight = true;

            let dispatch = Dispatch {
                timer: id,
                done: self.completions_tx.clone(),
                result: None,
            };
            let callback = (slot.callback)();
            self.dispatched += 1;
            tracing::trace!(timer = %id, "timer expired, dispatching callback");
            tokio::spawn(async move {
                dispatch.finish(callback.await);
            });
        }
    }

    fn complete(&mut self, done: Completion) {
        self.dispatched = self.dispatched.saturating_sub(1);
        if let Some(slot) = self.slots.get_mut(&done.timer) {
            slot.in_flight = false;
        }
        let failure = match done.result {
            Some(Ok(())) => return,
            Some(Err(error)) => ExpiryFailure::Failed {
                timer: done.timer,
                error,
            },
            None => ExpiryFailure::Panicked { timer: done.timer },
        };
        match &self.errors {
            Some(sink) => {
                if let Err(mpsc::error::SendError(failure)) = sink.send(failure) {
                    tracing::error!(?failure, "timer callback failed");
                }
            }
            None => tracing::error!(?failure, "timer callback failed"),
        }
    }

    async fn drain(&mut self) {
        while self.dispatched > 0 {
            match self.completions.recv().await {
                Some(done) => self.complete(done),
                None => break,
            }
        }
    }
}

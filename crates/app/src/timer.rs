//! Deadline timer — a cancellable, reschedulable single-shot delayed callback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tokio::sync::oneshot;

use idlewatch_domain::error::{LifecycleError, WatchError};
use idlewatch_domain::id::TimerId;
use idlewatch_domain::time::delay_from_secs;

use crate::scheduler::{Ack, Command, SchedulerHandle};

/// Future produced by an expiry callback.
pub type ExpiryFuture = Pin<Box<dyn Future<Output = Result<(), WatchError>> + Send>>;

/// Callback run by the scheduler when a timer expires.
pub type ExpiryCallback = Arc<dyn Fn() -> ExpiryFuture + Send + Sync>;

/// Lifecycle of a timer as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Created, never armed.
    Idle,
    /// A deadline is pending.
    Armed,
    /// The deadline elapsed and the callback is running.
    Firing,
    /// The callback ran for the last arm cycle.
    Fired,
    /// Cancelled; the timer never fires again.
    Cancelled,
}

/// What a cancel request found when it reached the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A pending (or not yet armed) expiry was discarded.
    Cancelled,
    /// The callback had already started; its effects are not undone.
    AlreadyFiring,
    /// The callback had already completed.
    AlreadyFired,
    /// The timer was cancelled before.
    AlreadyCancelled,
}

/// Handle to one timer owned by a [`Scheduler`](crate::scheduler::Scheduler).
///
/// Every method may be called from any thread. Arming never blocks; cancel
/// waits for the scheduler to apply the request. Dropping the handle releases
/// the timer, so a pending expiry never outlives its owner.
#[derive(Debug)]
pub struct DeadlineTimer {
    id: TimerId,
    scheduler: SchedulerHandle,
    terminal: AtomicBool,
}

impl DeadlineTimer {
    pub(crate) fn new(id: TimerId, scheduler: SchedulerHandle) -> Self {
        Self {
            id,
            scheduler,
            terminal: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Arm the timer to fire once after `delay_secs` seconds.
    ///
    /// If it is already armed, the pending deadline is replaced; the callback
    /// does not run for the discarded one.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a negative or non-finite delay, or a
    /// lifecycle error if the scheduler has stopped.
    pub fn arm(&self, delay_secs: f64) -> Result<(), WatchError> {
        let delay = delay_from_secs(delay_secs)?;
        self.arm_after(delay)?;
        Ok(())
    }

    /// Same as [`arm`](Self::arm); reads better at call sites resetting a deadline.
    ///
    /// # Errors
    ///
    /// See [`arm`](Self::arm).
    pub fn reschedule(&self, delay_secs: f64) -> Result<(), WatchError> {
        self.arm(delay_secs)
    }

    /// Arm with an already validated delay.
    ///
    /// Arming a cancelled timer does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SchedulerClosed`] if the scheduler has stopped.
    pub fn arm_after(&self, delay: Duration) -> Result<(), LifecycleError> {
        if self.terminal.load(Ordering::Acquire) {
            return Ok(());
        }
        self.scheduler.send(Command::Arm { id: self.id, delay })
    }

    /// Cancel the timer and wait for the scheduler to acknowledge.
    ///
    /// Safe to call repeatedly and concurrently; only one call ever observes
    /// [`CancelOutcome::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the scheduler is gone or does not answer
    /// within its acknowledgment timeout. The handle is then considered
    /// terminal and later calls are no-ops.
    pub async fn cancel(&self) -> Result<CancelOutcome, LifecycleError> {
        if self.terminal.load(Ordering::Acquire) {
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        let (tx, rx) = oneshot::channel();
        let result = match self.request_cancel(Ack::Async(tx)) {
            Ok(()) => {
                let timeout = self.scheduler.ack_timeout();
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(_)) => Err(LifecycleError::SchedulerClosed),
                    Err(_) => Err(timeout_error(timeout)),
                }
            }
            Err(err) => Err(err),
        };
        self.terminal.store(true, Ordering::Release);
        result
    }

    /// Cancel from a plain (non-async) thread, blocking until acknowledged.
    ///
    /// Must not be called from inside an async task: on a single-threaded
    /// runtime it would block the very scheduler it waits for (the wait is
    /// still bounded by the acknowledgment timeout).
    ///
    /// # Errors
    ///
    /// Same as [`cancel`](Self::cancel).
    pub fn cancel_blocking(&self) -> Result<CancelOutcome, LifecycleError> {
        if self.terminal.load(Ordering::Acquire) {
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let result = self.request_cancel(Ack::Blocking(tx)).and_then(|()| {
            let timeout = self.scheduler.ack_timeout();
            rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => timeout_error(timeout),
                RecvTimeoutError::Disconnected => LifecycleError::SchedulerClosed,
            })
        });
        self.terminal.store(true, Ordering::Release);
        result
    }

    /// Ask the scheduler for the current state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SchedulerClosed`] if the scheduler is gone.
    pub async fn state(&self) -> Result<TimerState, LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.scheduler.send(Command::Query { id: self.id, reply })?;
        let state = rx.await.map_err(|_| LifecycleError::SchedulerClosed)?;
        // A released slot is indistinguishable from a cancelled one.
        Ok(state.unwrap_or(TimerState::Cancelled))
    }

    fn request_cancel(&self, ack: Ack) -> Result<(), LifecycleError> {
        self.scheduler.send(Command::Cancel { id: self.id, ack })
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        let _ = self.scheduler.send(Command::Release { id: self.id });
    }
}

fn timeout_error(timeout: Duration) -> LifecycleError {
    LifecycleError::AckTimeout {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::scheduler::{Scheduler, SchedulerConfig};

    fn counting(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn() -> std::future::Ready<Result<(), WatchError>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_reject_non_finite_delay() {
        let (scheduler, handle) = Scheduler::new(SchedulerConfig::default());
        scheduler.start();
        let timer = handle.timer(counting(&Arc::new(AtomicUsize::new(0)))).unwrap();
        assert!(matches!(timer.arm(f64::NAN), Err(WatchError::Validation(_))));
        assert!(matches!(timer.reschedule(-2.0), Err(WatchError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_when_scheduler_never_runs() {
        // The scheduler exists but is never started: nobody answers.
        let (_scheduler, handle) = Scheduler::new(SchedulerConfig {
            ack_timeout: Duration::from_millis(200),
        });
        let timer = handle.timer(counting(&Arc::new(AtomicUsize::new(0)))).unwrap();

        assert_eq!(
            timer.cancel().await,
            Err(LifecycleError::AckTimeout { timeout_ms: 200 })
        );
        assert_eq!(timer.cancel().await, Ok(CancelOutcome::AlreadyCancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn should_cancel_from_plain_thread() {
        let (scheduler, handle) = Scheduler::new(SchedulerConfig::default());
        scheduler.start();
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = Arc::new(handle.arm(60.0, counting(&fired)).unwrap());

        let remote = Arc::clone(&timer);
        let outcome = std::thread::spawn(move || remote.cancel_blocking())
            .join()
            .unwrap();

        assert_eq!(outcome, Ok(CancelOutcome::Cancelled));
        assert_eq!(timer.state().await.unwrap(), TimerState::Cancelled);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn should_report_single_cancel_when_racing_threads() {
        let (scheduler, handle) = Scheduler::new(SchedulerConfig::default());
        scheduler.start();
        let timer = Arc::new(handle.arm(60.0, counting(&Arc::new(AtomicUsize::new(0)))).unwrap());

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let timer = Arc::clone(&timer);
                std::thread::spawn(move || timer.cancel_blocking())
            })
            .collect();
        let outcomes: Vec<_> = threads
            .into_iter()
            .map(|t| t.join().unwrap().unwrap())
            .collect();

        let cancelled = outcomes
            .iter()
            .filter(|o| **o == CancelOutcome::Cancelled)
            .count();
        assert_eq!(cancelled, 1);
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o, CancelOutcome::Cancelled | CancelOutcome::AlreadyCancelled))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_released_timer_as_cancelled() {
        let (scheduler, handle) = Scheduler::new(SchedulerConfig::default());
        scheduler.start();
        let timer = handle.timer(counting(&Arc::new(AtomicUsize::new(0)))).unwrap();
        handle.send(Command::Release { id: timer.id() }).unwrap();
        assert_eq!(timer.state().await.unwrap(), TimerState::Cancelled);
    }
}

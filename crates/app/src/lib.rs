//! # idlewatch-app
//!
//! Application layer — the runtime half of the inactivity-watch subsystem.
//!
//! ## Responsibilities
//! - Define **port traits** for the collaborators the subsystem talks to:
//!   - `EventPublisher` / `EventSubscriber` — the event bus
//!   - `Cancellable` — anything an owner cancels on teardown
//! - Own all timer state in a single **scheduler task**; other threads only
//!   send it commands (`Scheduler`, `DeadlineTimer`)
//! - Build **watches** on top of deadline timers (`Watch`)
//! - Bind watches and listeners to an owner's lifetime (`RuleContext`)
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `idlewatch-domain` only (plus `tokio` for the scheduler task and
//! channels). Never imports the daemon crate.

pub mod event_bus;
pub mod ports;
pub mod rule_context;
pub mod scheduler;
pub mod timer;
pub mod watch;

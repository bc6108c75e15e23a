//! # idlewatch-domain
//!
//! Pure domain model for the idlewatch inactivity-watch subsystem.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps, durations
//! - Define **Events** (value updates/changes and the synthesized no-update/no-change
//!   notifications) and the assignability rules between event kinds
//! - Define **Event filters** (declarative matchers used to build bus listeners)
//! - Define **Watch kinds** and the event each kind produces on expiry
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and never touches a runtime.
//! Timers, the event bus and owner lifecycles live in the `app` crate.

pub mod error;
pub mod id;
pub mod time;

pub mod event;
pub mod filter;
pub mod listener;
pub mod watch;

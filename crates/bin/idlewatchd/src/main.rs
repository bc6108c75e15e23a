//! # idlewatchd — inactivity watch daemon
//!
//! Composition root that wires the scheduler, the event bus and the
//! configured watches together.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Install the `tracing` subscriber
//! - Start the timer scheduler and report failed expiries
//! - Create one rule context and the configured watches
//! - Feed item values read from stdin to the watches
//! - Handle graceful shutdown (Ctrl-C or end of input)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod activity;
mod config;

use std::sync::Arc;

use idlewatch_app::event_bus::InProcessEventBus;
use idlewatch_app::rule_context::RuleContext;
use idlewatch_app::scheduler::{ExpiryFailure, Scheduler};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::activity::ActivityTracker;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Scheduler
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    let (scheduler, handle) = Scheduler::new(config.scheduler_config());
    let scheduler_task = scheduler.with_error_sink(failures_tx).start();
    let failure_task = tokio::spawn(async move {
        while let Some(failure) = failures_rx.recv().await {
            match failure {
                ExpiryFailure::Failed { timer, error } => {
                    tracing::error!(%timer, %error, "watch expiry failed");
                }
                ExpiryFailure::Panicked { timer } => {
                    tracing::error!(%timer, "watch expiry panicked");
                }
            }
        }
    });

    // Event bus
    let bus = Arc::new(InProcessEventBus::new(256));

    // Rule
    let ctx = RuleContext::new("idlewatchd", handle.clone(), Arc::clone(&bus));
    let mut tracker = ActivityTracker::new(Arc::clone(&bus));
    for watch_config in &config.watches {
        let watch = ctx.watch(&watch_config.name, watch_config.seconds, watch_config.kind)?;
        watch.listen_event(&ctx, "log_inactivity", |event| {
            tracing::info!(%event, "inactivity detected");
        })?;
        tracing::info!(%watch, "watch started");
        tracker.track(watch);
    }
    if config.watches.is_empty() {
        tracing::warn!("no watches configured, nothing to do");
    }

    // Activity
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some((name, value)) = activity::parse_line(&line) else {
                        continue;
                    };
                    match tracker.record(name, value).await {
                        Ok(activity) => tracing::debug!(
                            name,
                            changed = activity.changed,
                            rescheduled = activity.rescheduled,
                            "activity recorded"
                        ),
                        Err(err) => tracing::warn!(%err, name, "failed to record activity"),
                    }
                }
                Ok(None) => {
                    tracing::info!("end of input, shutting down");
                    break;
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to read input");
                    break;
                }
            },
        }
    }

    // Shutdown
    if let Err(err) = ctx.unload().await {
        tracing::warn!(%err, "rule did not unload cleanly");
    }
    drop(tracker);
    handle.shutdown();
    scheduler_task.await?;
    failure_task.await?;

    Ok(())
}

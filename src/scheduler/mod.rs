//! Periodic task runner.
//!
//! Each task runs on its own loop and owns its state outright. A tick is
//! awaited to completion before the next interval tick is even polled, so two
//! ticks of one task can never overlap; ticks that fall due while one is
//! still running are skipped. Shutdown is observed between ticks only, so a
//! merge and its persist always land together.

pub mod tasks;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

pub use tasks::{IndexerTask, SamplerTask};

#[async_trait]
pub trait PeriodicTask: Send {
    fn name(&self) -> &'static str;

    /// One unit of work. `now` is unix seconds at tick start.
    async fn tick(&mut self, now: u64);
}

pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Run `task` every `period` until `shutdown` turns true or its sender is
/// dropped. Returns the task so callers can inspect its final state.
pub async fn run_periodic<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> T {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(task = task.name(), period = ?period, "periodic task started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }
        task.tick(unix_now()).await;
    }

    info!(task = task.name(), "periodic task stopped");
    task
}

//! Self-rescheduling timers.
//!
//! A schedule sleeps, runs its task to completion, then sleeps for whatever
//! delay that run returned. Runs of one schedule therefore never overlap, and
//! the period drifts by the run time.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub name: &'static str,
    pub first_delay: Duration,
    /// Delay used after a run that panicked.
    pub fallback: Duration,
}

impl Schedule {
    /// A fixed-interval schedule whose first run is one interval away.
    pub fn every(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            first_delay: interval,
            fallback: interval,
        }
    }

    pub fn starting_after(mut self, first_delay: Duration) -> Self {
        self.first_delay = first_delay;
        self
    }
}

/// Drive `task` on `schedule` until shutdown is signalled.
///
/// Each run executes in its own spawned task so a panic is contained and
/// logged; the loop then waits `schedule.fallback`.
pub async fn run_self_rescheduling<F, Fut>(
    schedule: Schedule,
    mut shutdown: broadcast::Receiver<()>,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Duration> + Send + 'static,
{
    info!(task = schedule.name, first_in_secs = schedule.first_delay.as_secs(), "timer armed");
    let mut delay = schedule.first_delay;
    loop {
        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = shutdown.recv() => {
                info!(task = schedule.name, "received shutdown signal, exiting loop");
                return;
            }
        }

        let started = Instant::now();
        delay = match tokio::spawn(task()).await {
            Ok(next) => next,
            Err(e) => {
                error!(task = schedule.name, error = %e, "scheduled run failed");
                schedule.fallback
            }
        };
        debug!(
            task = schedule.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            next_in_secs = delay.as_secs(),
            "scheduled run finished"
        );
    }
}

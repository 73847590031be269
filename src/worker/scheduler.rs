//! Tick scheduler.
//!
//! Fires the poll cycle on a fixed interval or a cron expression and keeps
//! it single-flight: a tick that would overlap a running one is skipped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, TickError};
use crate::pipeline::PollCycle;
use crate::pipeline::types::TickOutcome;

/// Every minute, on the minute.
pub const DEFAULT_SCHEDULE: &str = "0 * * * * *";

/// When ticks fire.
#[derive(Debug, Clone)]
pub enum Schedule {
    Every(Duration),
    Cron(cron::Schedule),
}

impl Schedule {
    /// Time to wait from `now` until the next tick. `None` when a cron
    /// expression has no future occurrence.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Schedule::Every(period) => Some(*period),
            Schedule::Cron(schedule) => schedule
                .after(&now)
                .next()
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO)),
        }
    }
}

impl FromStr for Schedule {
    type Err = ConfigError;

    /// A bare number is an interval in seconds; anything else is a cron
    /// expression (seconds field first).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(secs) = s.parse::<u64>() {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "AUTOREPLY_SCHEDULE".to_string(),
                    message: "interval must be at least one second".to_string(),
                });
            }
            return Ok(Schedule::Every(Duration::from_secs(secs)));
        }
        cron::Schedule::from_str(s)
            .map(Schedule::Cron)
            .map_err(|e| ConfigError::InvalidValue {
                key: "AUTOREPLY_SCHEDULE".to_string(),
                message: format!("invalid cron '{s}': {e}"),
            })
    }
}

impl Default for Schedule {
    fn default() -> Self {
        match cron::Schedule::from_str(DEFAULT_SCHEDULE) {
            Ok(schedule) => Schedule::Cron(schedule),
            Err(_) => Schedule::Every(Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(period) => write!(f, "every {}s", period.as_secs()),
            Schedule::Cron(schedule) => write!(f, "cron '{schedule}'"),
        }
    }
}

/// Serializes ticks of one [`PollCycle`].
pub struct Poller {
    cycle: PollCycle,
    in_flight: Mutex<()>,
}

impl Poller {
    pub fn new(cycle: PollCycle) -> Self {
        Self {
            cycle,
            in_flight: Mutex::new(()),
        }
    }

    /// Run a tick now unless one is already running. `None` means skipped.
    pub async fn run_now(&self) -> Option<Result<TickOutcome, TickError>> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Previous tick still running, skipping");
            return None;
        };
        let result = self.cycle.run_tick().await;
        log_tick_result(&result);
        Some(result)
    }
}

fn log_tick_result(result: &Result<TickOutcome, TickError>) {
    match result {
        Ok(outcome @ TickOutcome::Idle) => debug!(outcome = outcome.label(), "Tick finished"),
        Ok(outcome) => info!(outcome = outcome.label(), "Tick finished"),
        Err(e) => error!(stage = e.stage.label(), error = %e, "Tick failed"),
    }
}

/// Spawn the background poll loop.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop after
/// the current wait; use [`shutdown`] to also wait out a running tick.
pub fn spawn_poller(
    poller: Arc<Poller>,
    schedule: Schedule,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(%schedule, "Poller started");

        loop {
            let Some(delay) = schedule.next_delay(Utc::now()) else {
                warn!(%schedule, "Schedule has no future occurrence, poller stopping");
                return;
            };
            tokio::time::sleep(delay).await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Poller shutting down");
                return;
            }

            poller.run_now().await;
        }
    });

    (handle, shutdown_flag)
}

/// Stop the poll loop without interrupting a tick in progress.
pub async fn shutdown(poller: &Poller, handle: JoinHandle<()>, flag: &AtomicBool) {
    flag.store(true, Ordering::Relaxed);
    let _guard = poller.in_flight.lock().await;
    handle.abort();
    if let Err(e) = handle.await
        && !e.is_cancelled()
    {
        error!(error = %e, "Poller task failed");
    }
}

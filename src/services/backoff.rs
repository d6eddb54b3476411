//! Dual-class retry backoff for provider calls.
//!
//! Two transient failure classes retry on independent schedules:
//! capacity overload (HTTP 529/500) and throughput throttling
//! (HTTP 429). Each doubles from its own starting delay up to its own
//! cap, and both share one absolute deadline fixed when the logical
//! call starts. A delay whose sleep would finish past the deadline is
//! refused, so the total retry wait never exceeds the window.

use tokio::time::{Duration, Instant};

use crate::domain::models::BackoffConfig;

/// Which retry schedule a transient failure follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffClass {
    Overload,
    Throttle,
}

#[derive(Debug, Clone, Copy)]
struct ClassSchedule {
    initial: Duration,
    max: Duration,
}

/// Immutable retry schedule, built once from configuration.
#[derive(Debug, Clone, Copy)]
pub struct BackoffSchedule {
    overload: ClassSchedule,
    throttle: ClassSchedule,
    deadline: Duration,
}

impl BackoffSchedule {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            overload: ClassSchedule {
                initial: Duration::from_secs(config.overload.initial_secs),
                max: Duration::from_secs(config.overload.max_secs),
            },
            throttle: ClassSchedule {
                initial: Duration::from_secs(config.throttle.initial_secs),
                max: Duration::from_secs(config.throttle.max_secs),
            },
            deadline: Duration::from_secs(config.deadline_secs),
        }
    }

    /// Begin tracking one logical provider call.
    ///
    /// The absolute deadline is computed here, exactly once, so a call
    /// alternating between failure classes cannot extend its window.
    pub fn start(&self) -> BackoffState {
        BackoffState {
            deadline_at: Instant::now() + self.deadline,
            next_overload: self.overload.initial,
            next_throttle: self.throttle.initial,
            overload_max: self.overload.max,
            throttle_max: self.throttle.max,
        }
    }
}

/// Mutable per-call retry state.
#[derive(Debug)]
pub struct BackoffState {
    deadline_at: Instant,
    next_overload: Duration,
    next_throttle: Duration,
    overload_max: Duration,
    throttle_max: Duration,
}

impl BackoffState {
    /// Delay to sleep before the next attempt, or `None` when that
    /// sleep would cross the deadline and the error should propagate.
    pub fn next_delay(&mut self, class: BackoffClass) -> Option<Duration> {
        let delay = match class {
            BackoffClass::Overload => self.next_overload,
            BackoffClass::Throttle => self.next_throttle,
        };
        if Instant::now() + delay > self.deadline_at {
            return None;
        }

        match class {
            BackoffClass::Overload => {
                self.next_overload = (delay * 2).min(self.overload_max);
            }
            BackoffClass::Throttle => {
                self.next_throttle = (delay * 2).min(self.throttle_max);
            }
        }
        Some(delay)
    }
}

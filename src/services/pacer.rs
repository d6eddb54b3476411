//! Outbound-call pacing.
//!
//! One `RequestPacer` is shared (via `Arc`) by every session in the
//! process so concurrent sessions collectively stay under the provider
//! request rate, not just individually.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};
use tracing::debug;

/// Enforces a minimum spacing between outbound provider calls.
pub struct RequestPacer {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self::new(Duration::from_secs_f64(secs))
    }

    /// Wait until a call slot opens, then claim it.
    ///
    /// The lock is held across the sleep so concurrent callers are
    /// serialized and each claims its own full interval.
    pub async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Pacing outbound call");
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

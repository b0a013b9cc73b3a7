//! Fetch-start throttling shared by every worker of a run.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Enforces at most `max_starts` fetch starts per rolling `window`.
///
/// Slots are handed out `window / max_starts` apart. Callers queue on a fair
/// mutex, so slots are granted in the order `acquire()` was called.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter allowing `max_starts` starts per `window`.
    /// A zero window (or zero starts) disables throttling.
    pub fn new(max_starts: u32, window: Duration) -> Self {
        let interval = if max_starts == 0 || window.is_zero() {
            Duration::ZERO
        } else {
            window / max_starts
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Minimum spacing between two granted slots.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next fetch slot.
    ///
    /// Dropping the future before it resolves gives up the wait but the
    /// reserved slot is not handed to anyone else.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        trace!(
            wait_ms = slot.saturating_duration_since(Instant::now()).as_millis() as u64,
            "rate slot reserved"
        );
        tokio::time::sleep_until(slot).await;
    }
}

//! Bounded retries with exponential backoff around a single source fetch.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use leadharvest_shared::{FetchAttempt, FetchError, PipelineConfig, RawRecord};

use crate::rate::RateLimiter;

/// 1-based attempt number handed to each invocation of the fetch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempt(u32);

impl Attempt {
    pub const FIRST: Attempt = Attempt(1);

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Attempt(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal result of [`RetryPolicy::execute`].
#[derive(Debug)]
pub enum RetryOutcome {
    /// The operation succeeded on attempt number `attempts`.
    Success {
        records: Vec<RawRecord>,
        attempts: u32,
    },
    /// Permanent failure, or transient failures until the attempt ceiling.
    Failed { error: FetchError, attempts: u32 },
    /// Cancelled before the first attempt started.
    Cancelled,
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }
}

/// Retry configuration plus a shared counter of attempts made.
///
/// Clones share the counter, so one policy can be handed to every worker of
/// a run and read back afterwards.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    jitter: bool,
    attempts_made: Arc<AtomicU64>,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter: false,
            attempts_made: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay).with_jitter(config.retry_jitter)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Total attempts made through this policy and its clones.
    pub fn attempts_made(&self) -> u64 {
        self.attempts_made.load(Ordering::Relaxed)
    }

    /// Backoff before the attempt following `failed`: `base * 2^(n-1)`, plus up
    /// to a quarter of that again when jitter is enabled.
    pub fn backoff_delay(&self, failed: Attempt) -> Duration {
        let exp = failed.number().saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let max_extra = (delay.as_millis() / 4) as u64;
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        delay + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt ceiling
    /// is reached. Every attempt waits for a slot on `limiter` first.
    ///
    /// Cancellation stops the wait for a slot or a backoff; an attempt that
    /// already started is allowed to finish.
    pub async fn execute<F, Fut>(
        &self,
        limiter: &RateLimiter,
        cancel: &CancellationToken,
        mut op: F,
    ) -> RetryOutcome
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = FetchAttempt>,
    {
        let mut attempt = Attempt::FIRST;
        let mut last_error: Option<FetchError> = None;

        loop {
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = limiter.acquire() => false,
            };
            if cancelled {
                return match last_error {
                    Some(error) => RetryOutcome::Failed {
                        error,
                        attempts: attempt.number() - 1,
                    },
                    None => RetryOutcome::Cancelled,
                };
            }

            self.attempts_made.fetch_add(1, Ordering::Relaxed);
            debug!(attempt = attempt.number(), "fetch attempt");

            let error = match op(attempt).await {
                FetchAttempt::Success(records) => {
                    return RetryOutcome::Success {
                        records,
                        attempts: attempt.number(),
                    };
                }
                FetchAttempt::Failure(error) => error,
            };

            if !error.is_transient() {
                debug!(
                    attempt = attempt.number(),
                    kind = %error.kind,
                    "permanent failure, not retrying"
                );
                return RetryOutcome::Failed {
                    error,
                    attempts: attempt.number(),
                };
            }

            if attempt.number() >= self.max_attempts {
                warn!(
                    attempts = attempt.number(),
                    kind = %error.kind,
                    "retries exhausted"
                );
                return RetryOutcome::Failed {
                    error,
                    attempts: attempt.number(),
                };
            }

            let delay = self.backoff_delay(attempt);
            debug!(
                attempt = attempt.number(),
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "transient failure, backing off"
            );

            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                debug!(attempt = attempt.number(), "run cancelled during backoff");
                return RetryOutcome::Failed {
                    error,
                    attempts: attempt.number(),
                };
            }

            last_error = Some(error);
            attempt = attempt.next();
        }
    }
}

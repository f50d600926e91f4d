//! Retry driver shared by every network stage.
//!
//! Each stage classifies a single attempt as [`Attempt::Ready`],
//! [`Attempt::Retryable`] or [`Attempt::Fatal`]; [`retry`] keeps calling it
//! until it is ready, fails fatally, or the [`RetryPolicy`] runs out. What an
//! exhausted policy means is up to the stage.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

use crate::error::AccessError;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,

    /// `multiplier * 2^attempt`, capped at `max`: 2s, 4s, 8s, ... for a 1s multiplier.
    Exponential { multiplier: Duration, max: Duration },

    /// Uniformly random between `min` and `max`, so concurrent builds
    /// do not poll in lockstep.
    Randomized { min: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { multiplier, max } => multiplier
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(max),
            Backoff::Randomized { min, max } => {
                if min >= max {
                    return min;
                }
                let ms = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
                Duration::from_millis(ms as u64)
            }
        }
    }

    /// Longest delay this backoff can produce.
    pub fn max_delay(&self) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { max, .. } => max,
            Backoff::Randomized { min, max } => min.max(max),
        }
    }
}

/// When to stop retrying and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling, including the first attempt.
    pub max_attempts: Option<u32>,

    /// Wall-clock ceiling measured from the first attempt.
    pub deadline: Option<Duration>,

    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Stop after `max_attempts` attempts.
    pub fn attempts(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            deadline: None,
            backoff,
        }
    }

    /// Stop once `deadline` has elapsed since the first attempt.
    pub fn deadline(deadline: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: None,
            deadline: Some(deadline),
            backoff,
        }
    }

    fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.deadline.is_some_and(|deadline| elapsed >= deadline)
    }
}

/// Classified outcome of one attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Ready(T),
    Retryable(AccessError),
    Fatal(AccessError),
}

impl<T> Attempt<T> {
    /// Classify a result by [`AccessError::is_transient`].
    pub fn from_result(result: Result<T, AccessError>) -> Self {
        match result {
            Ok(value) => Attempt::Ready(value),
            Err(e) if e.is_transient() => Attempt::Retryable(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// Why [`retry`] gave up.
#[derive(Debug)]
pub enum RetryError {
    /// An attempt failed in a way retrying cannot fix.
    Fatal(AccessError),

    /// The policy ran out while attempts were still retryable.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: AccessError,
    },
}

impl RetryError {
    /// The underlying error, dropping the exhaustion details.
    pub fn into_error(self) -> AccessError {
        match self {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` until it is ready, fails fatally, or `policy` is exhausted.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, stage: &str, mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Fatal(e) => return Err(RetryError::Fatal(e)),
            Attempt::Retryable(e) => {
                let elapsed = started.elapsed();
                if policy.is_exhausted(attempt, elapsed) {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        elapsed,
                        last: e,
                    });
                }

                let delay = policy.backoff.delay(attempt);
                debug!(stage, attempt, ?delay, error = %e, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

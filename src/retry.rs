//! Retry Policy Executor
//!
//! Bounded retry over an async operation. One executor serves every retry
//! domain in the crate; only the predicate changes:
//! - transient backoff in the write façade ([`crate::is_temporary_error`])
//! - CAS-conflict recompute in the atomic engine ([`retry_always`])
//!
//! ## Attempt loop
//! ```text
//! attempt 1 ──► Ok ───────────────────────────────► return Ok
//!     │
//!     └──► Err ─► attempt == max? ─ yes ──────────► return Err (last error)
//!                      │ no
//!                 predicate(err)? ─ no ───────────► return Err
//!                      │ yes
//!                 sleep(interval) ─► attempt + 1
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Retry configuration: how many attempts, how far apart, and which errors
/// qualify
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig<P> {
    /// Total attempts including the first one (values below 1 act as 1)
    pub max_attempts: u32,

    /// Delay between attempts (zero means retry immediately)
    pub interval: Duration,

    /// Decides whether a failure may be retried
    pub predicate: P,
}

impl<P> RetryConfig<P> {
    pub fn new(max_attempts: u32, interval: Duration, predicate: P) -> Self {
        Self {
            max_attempts,
            interval,
            predicate,
        }
    }
}

/// Predicate that retries every failure
pub fn retry_always<E>(_err: &E) -> bool {
    true
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts
///
/// `operation` receives the 1-based attempt number. The error returned on
/// exhaustion is the last one observed, unchanged. With `max_attempts == 1`
/// the predicate is never consulted.
pub async fn retry<T, E, P, F, Fut>(config: &RetryConfig<P>, mut operation: F) -> Result<T, E>
where
    P: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            if max_attempts > 1 {
                tracing::warn!(attempt, max_attempts, error = %err, "retries exhausted");
            }
            return Err(err);
        }

        if !(config.predicate)(&err) {
            tracing::debug!(attempt, error = %err, "error not retryable");
            return Err(err);
        }

        tracing::debug!(
            attempt,
            max_attempts,
            interval_ms = config.interval.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );

        if !config.interval.is_zero() {
            tokio::time::sleep(config.interval).await;
        }

        attempt += 1;
    }
}

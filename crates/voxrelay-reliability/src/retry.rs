//! Retry-with-backoff for the stateful agent service's slow path and its
//! background memory-sync task. Never applied to the fast-path LLM call,
//! health checks, or HTTP control-plane requests (those have their own
//! timeouts and must not compound latency).

use std::future::Future;
use std::time::Duration;

/// Tunables for `retry_with_backoff`.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Per-attempt timeout.
    pub per_attempt_timeout: Duration,
    /// Base for the exponential backoff: `base.pow(retry_index)` seconds
    /// between attempt `i` and `i + 1`.
    pub backoff_base_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            per_attempt_timeout: Duration::from_secs(10),
            backoff_base_secs: 2,
        }
    }
}

/// Why `retry_with_backoff` ultimately gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt timed out or failed; carries the last error.
    Exhausted(E),
    /// Every attempt timed out.
    AllTimedOut,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted(e) => write!(f, "retry attempts exhausted: {e}"),
            RetryError::AllTimedOut => write!(f, "all retry attempts timed out"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Runs `op` up to `config.attempts` times, with an exponential backoff
/// sleep between attempts and a timeout applied to each individual attempt.
///
/// `op` is re-invoked (not resumed) on each attempt; callers must re-check
/// any externally-guarded precondition (e.g. the circuit breaker) inside the
/// closure on each call.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: RetryConfig,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err: Option<E> = None;
    let mut any_timed_out = false;

    for attempt in 0..config.attempts {
        let result = tokio::time::timeout(config.per_attempt_timeout, op()).await;
        match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                last_err = Some(e);
            }
            Err(_) => {
                any_timed_out = true;
                tracing::warn!(attempt, "retry attempt timed out");
            }
        }

        let is_last = attempt + 1 == config.attempts;
        if !is_last {
            let backoff_secs = config.backoff_base_secs.saturating_pow(attempt + 1);
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        }
    }

    match last_err {
        Some(e) => Err(RetryError::Exhausted(e)),
        None if any_timed_out => Err(RetryError::AllTimedOut),
        None => unreachable!("loop must produce a result, an error, or a timeout"),
    }
}

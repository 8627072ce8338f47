//! Per-dependency circuit breaker.
//!
//! State transitions: `Closed` -(`failure_threshold` consecutive
//! failures)-> `Open` -(`open_timeout` elapses)-> `HalfOpen`
//! -(success)-> `Closed`, or `HalfOpen` -(failure)-> `Open`.
//!
//! The lock guards only the small state struct; callers never hold it
//! across an `.await` (no I/O happens inside `before_call`/`on_success`/
//! `on_failure`), following the same discipline as the platform's
//! request-rate limiter.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use voxrelay_types::CircuitState;

/// Tunables for a circuit breaker instance.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Whether a call is currently allowed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    /// Proceed normally (state is `Closed`).
    Allowed,
    /// Proceed as a single trial call (state transitioned `Open` -> `HalfOpen`).
    Trial,
    /// Fast-fail: the breaker is `Open` and the timeout has not elapsed.
    Denied,
}

/// A process-wide, per-dependency circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, for diagnostics. Does not mutate the breaker.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).state
    }

    /// Call before attempting the guarded operation. Returns whether the
    /// call should proceed, and if `Trial`, transitions the breaker to
    /// `HalfOpen` so only one caller runs the trial.
    pub fn before_call(&self) -> CallPermit {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            CircuitState::Closed => CallPermit::Allowed,
            CircuitState::HalfOpen => CallPermit::Denied,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    CallPermit::Trial
                } else {
                    CallPermit::Denied
                }
            }
        }
    }

    /// Records a successful call. Resets the breaker to `Closed` regardless
    /// of prior state.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    /// Records a failed call. Opens the breaker if the failure threshold is
    /// reached from `Closed`, or immediately if the trial call from
    /// `HalfOpen` failed.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failure_count = inner.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("circuit breaker half-open trial failed, reopening");
            }
            CircuitState::Open => {
                // Already open; nothing to do.
            }
        }
    }
}

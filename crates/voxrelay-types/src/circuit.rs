//! Circuit-breaker state enumeration.
//!
//! The state machine itself (transition logic, timing) lives in
//! `voxrelay-reliability`; this crate only defines the shared vocabulary so
//! that state can be reported across crate boundaries (e.g. in diagnostics).

use serde::{Deserialize, Serialize};

/// The three states of a circuit breaker.
///
/// Transitions: `Closed` -(threshold consecutive failures)-> `Open` ->
/// (timeout elapses) -> `HalfOpen` -(success)-> `Closed`, or
/// `HalfOpen` -(failure)-> `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed
    }
}

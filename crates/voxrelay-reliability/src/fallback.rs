//! The guaranteed-fallback reply catalog.
//!
//! This is a hard contract: the LLM node must always return a non-empty,
//! user-safe reply. Every path that reaches for a fallback logs it as a
//! `CRITICAL FALLBACK` so operators can see how often the voice experience
//! degraded to a canned line.

use tracing::error;

/// Why a fallback reply was needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The stateful agent service's circuit breaker is open.
    LettaDown,
    /// An LLM call (fast or slow path) timed out after all retries.
    LlmTimeout,
    /// Any other unexpected failure.
    Unknown,
}

impl FallbackReason {
    fn key(self) -> &'static str {
        match self {
            Self::LettaDown => "letta_down",
            Self::LlmTimeout => "llm_timeout",
            Self::Unknown => "unknown",
        }
    }

    fn text(self) -> &'static str {
        match self {
            Self::LettaDown => {
                "I'm having trouble reaching my memory right now, but I'm still here — could you say that again?"
            }
            Self::LlmTimeout => {
                "Sorry, that took longer than expected. Could you repeat the question?"
            }
            Self::Unknown => "Sorry, something went wrong on my end. Could you try again?",
        }
    }
}

/// Returns the guaranteed fallback reply for `reason`, logging it as a
/// critical event.
pub fn fallback_reply(reason: FallbackReason) -> String {
    error!(reason = reason.key(), "CRITICAL FALLBACK");
    reason.text().to_string()
}

//! Request fingerprinting for LLM-node deduplication.
//!
//! Derived from the user's transcribed message (normalized) plus the agent
//! id, so that concurrent or closely-repeated queries to the same agent
//! collapse onto the same in-flight (or recently-completed) request.

use sha2::{Digest, Sha256};
use std::fmt;

/// An opaque, stable identifier for a (normalized message, agent) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Computes the fingerprint for a raw user message and agent id.
    ///
    /// The message is normalized (trimmed, lowercased, internal whitespace
    /// collapsed) before hashing so that trivial transcription differences
    /// ("Hello!" vs "hello! ") still dedupe.
    pub fn compute(raw_message: &str, agent_id: &str) -> Self {
        let normalized = normalize(raw_message);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"\0");
        hasher.update(agent_id.as_bytes());
        let digest = hasher.finalize();
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The suffix used in debug transcript prefixes.
    pub fn suffix(&self, len: usize) -> &str {
        let n = self.0.len().saturating_sub(len);
        &self.0[n..]
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalizes a transcribed message for fingerprinting: trims, lowercases,
/// and collapses runs of whitespace to a single space.
pub fn normalize(message: &str) -> String {
    message
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

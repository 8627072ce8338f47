//! Room and participant listing types returned by the fabric.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub name: String,
    pub num_participants: u32,
    /// Unix epoch seconds the room was created.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub identity: String,
    /// Unix epoch seconds the participant joined.
    pub joined_at: i64,
}

/// Well-known identity markers used by the room-health monitor's
/// human/agent partition heuristic (see `voxrelay-worker::health_monitor`).
pub const AGENT_IDENTITY_MARKERS: [&str; 3] = ["agent", "bot", "voxrelay-worker"];

/// Returns whether `identity` looks like an agent/worker participant rather
/// than a human, based on `AGENT_IDENTITY_MARKERS`.
pub fn looks_like_agent_identity(identity: &str) -> bool {
    let lower = identity.to_lowercase();
    AGENT_IDENTITY_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

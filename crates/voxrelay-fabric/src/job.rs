//! The `JobRequest` event delivered by the fabric's worker registration
//! channel when a room needs a worker.

/// A request from the fabric asking a registered worker to serve a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub room_name: String,
}

impl JobRequest {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            room_name: room_name.into(),
        }
    }
}

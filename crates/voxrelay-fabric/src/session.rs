//! The worker-facing surface of the fabric: job delivery and the per-room
//! session a worker uses once it has accepted a [`JobRequest`].
//!
//! The media fabric itself, the WebRTC transport, and the wire protocol
//! used to register a worker and receive jobs are deliberately out of
//! scope — they are consumed through this interface instead. Production
//! wiring of [`WorkerTransport`]/[`RoomSession`] against a live fabric
//! deployment is left to the integrator; this crate defines the contract
//! and an in-memory fake used by the worker crate's own tests.

use crate::error::FabricError;
use crate::job::JobRequest;
use async_trait::async_trait;

/// Output configuration for a room session. `audio_enabled` has no default
/// — omitting it silently disables TTS, so callers must decide explicitly.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub transcription_enabled: bool,
    pub audio_enabled: bool,
}

/// Events a room session can deliver to the voice assistant loop.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ParticipantConnected { identity: String },
    ParticipantDisconnected { identity: String },
    DataReceived { from: String, payload: Vec<u8> },
    /// A finalized utterance of user audio, already run through STT by the
    /// transport layer (or handed here raw for the assistant's own STT
    /// provider to transcribe — see `VoiceAssistant::with_stt`).
    AudioReceived { from: String, pcm: Vec<u8> },
}

/// A live session in one room, handed to the worker after it accepts a
/// [`JobRequest`].
#[async_trait]
pub trait RoomSession: Send + Sync {
    fn room_name(&self) -> &str;

    /// Publishes a data-channel payload to the room.
    async fn publish_data(&self, bytes: &[u8], reliable: bool) -> Result<(), FabricError>;

    /// Publishes synthesized speech (raw PCM) as the assistant's audio
    /// track for this room.
    async fn publish_audio(&self, pcm: &[u8]) -> Result<(), FabricError>;

    /// Awaits the next room event (participant join/leave, data received).
    /// Returns `None` once the session has been torn down.
    async fn next_event(&self) -> Option<RoomEvent>;

    /// The number of participants currently in the room identified as
    /// human (i.e. not matching the agent-identity heuristic).
    fn human_participant_count(&self) -> usize;

    /// Starts the agent's audio/transcription pipeline for this session.
    /// `options.audio_enabled` must be set explicitly.
    fn start(&self, options: OutputOptions);
}

/// The fabric's worker registration and job-dispatch channel.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Registers this process as a worker under `agent_name`. Idempotent;
    /// blocks until the fabric acknowledges registration.
    async fn register(&self, agent_name: &str) -> Result<(), FabricError>;

    /// Awaits the next `JobRequest`. Returns `None` when the transport has
    /// shut down.
    async fn next_job_request(&self) -> Option<JobRequest>;

    /// Accepts `job`, returning the room session the worker should drive.
    async fn accept(&self, job: &JobRequest) -> Result<Box<dyn RoomSession>, FabricError>;

    /// Rejects `job`. Not retried by this process; the fabric may
    /// re-dispatch elsewhere.
    async fn reject(&self, job: &JobRequest) -> Result<(), FabricError>;
}

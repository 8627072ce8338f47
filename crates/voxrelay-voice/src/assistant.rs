//! The per-room voice assistant: owns one room session, drives its data
//! channel and audio pipeline, enforces the primary-agent lock, and
//! dispatches user turns to the LLM node.

use crate::data_channel::{ClientMessage, ServerMessage, TranscriptRole};
use crate::error::VoiceError;
use crate::instance::AgentInstance;
use crate::llm_node::{LlmMode, LlmNode};
use crate::providers::{SttProvider, TtsProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use voxrelay_fabric::{OutputOptions, RoomEvent, RoomSession};
use voxrelay_types::RequestFingerprint;

/// Idle time after which `is_idle` reports true.
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 300;

/// The agent identity this process is locked to serving. Both fields must
/// match for a switch request to be honored.
#[derive(Debug, Clone)]
pub struct PrimaryAgent {
    pub id: String,
    pub name: String,
}

/// A single room's live voice assistant.
pub struct VoiceAssistant {
    instance: Arc<AgentInstance>,
    room_session: Box<dyn RoomSession>,
    llm_node: Arc<LlmNode>,
    mode: LlmMode,
    primary_agent: PrimaryAgent,
    stt: Option<Arc<dyn SttProvider>>,
    tts: Option<Arc<dyn TtsProvider>>,
    request_in_flight: AtomicBool,
    shutdown_requested: AtomicBool,
    last_activity: Mutex<Instant>,
    idle_timeout: Duration,
    debug_transcripts: bool,
}

impl VoiceAssistant {
    pub fn new(
        instance: Arc<AgentInstance>,
        room_session: Box<dyn RoomSession>,
        llm_node: Arc<LlmNode>,
        mode: LlmMode,
        primary_agent: PrimaryAgent,
    ) -> Self {
        Self {
            instance,
            room_session,
            llm_node,
            mode,
            primary_agent,
            stt: None,
            tts: None,
            request_in_flight: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECONDS),
            debug_transcripts: false,
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_debug_transcripts(mut self, enabled: bool) -> Self {
        self.debug_transcripts = enabled;
        self
    }

    pub fn with_stt(mut self, stt: Arc<dyn SttProvider>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn with_tts(mut self, tts: Arc<dyn TtsProvider>) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Starts the room's audio/transcription pipeline. `audio_enabled` has
    /// no default; callers decide explicitly.
    pub fn start(&self, transcription_enabled: bool, audio_enabled: bool) {
        self.room_session.start(OutputOptions {
            transcription_enabled,
            audio_enabled,
        });
    }

    /// Drives the room's event loop until the session ends, a
    /// `room_cleanup` message is received, or the idle timeout elapses.
    pub async fn run(&self) {
        loop {
            if self.shutdown_requested.load(Ordering::Acquire) {
                tracing::info!(room = %self.room_session.room_name(), "room cleanup requested, ending session");
                break;
            }

            let idle_deadline = {
                let last = *self.last_activity.lock().await;
                self.idle_timeout.saturating_sub(last.elapsed())
            };

            tokio::select! {
                event = self.room_session.next_event() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::info!(room = %self.room_session.room_name(), "room session ended");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(idle_deadline) => {
                    if self.is_idle().await {
                        tracing::info!(room = %self.room_session.room_name(), "room idle, ending session");
                        break;
                    }
                }
            }
        }
    }

    pub async fn is_idle(&self) -> bool {
        self.room_session.human_participant_count() == 0
            && self.last_activity.lock().await.elapsed() >= self.idle_timeout
    }

    async fn touch_activity(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    async fn handle_event(&self, event: RoomEvent) {
        self.touch_activity().await;
        match event {
            RoomEvent::ParticipantConnected { identity } => {
                tracing::info!(room = %self.room_session.room_name(), %identity, "participant connected");
            }
            RoomEvent::ParticipantDisconnected { identity } => {
                tracing::info!(room = %self.room_session.room_name(), %identity, "participant disconnected");
            }
            RoomEvent::DataReceived { from, payload } => {
                if let Err(e) = self.handle_data(&from, &payload).await {
                    tracing::warn!(room = %self.room_session.room_name(), %from, error = %e, "data-channel message failed");
                    let _ = self
                        .room_session
                        .publish_data(
                            &ServerMessage::Error {
                                message: e.to_string(),
                            }
                            .to_json_bytes(),
                            true,
                        )
                        .await;
                }
            }
            RoomEvent::AudioReceived { from, pcm } => {
                if let Err(e) = self.handle_audio(&from, &pcm).await {
                    tracing::warn!(room = %self.room_session.room_name(), %from, error = %e, "audio turn failed");
                }
            }
        }
    }

    async fn handle_data(&self, _from: &str, payload: &[u8]) -> Result<(), VoiceError> {
        // Unrecognized `type` values fail to deserialize into `ClientMessage`
        // and are silently dropped here rather than surfaced as an error.
        let message: ClientMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };
        match message {
            ClientMessage::AgentSelection { agent_id, agent_name } => {
                self.switch_agent(agent_id, agent_name).await
            }
            ClientMessage::RoomCleanup => {
                self.shutdown_requested.store(true, Ordering::Release);
                Ok(())
            }
            ClientMessage::UserText { text } => self.handle_user_turn(&text).await,
        }
    }

    async fn handle_audio(&self, from: &str, pcm: &[u8]) -> Result<(), VoiceError> {
        let stt = match &self.stt {
            Some(stt) => stt.clone(),
            None => return Ok(()),
        };
        let text = stt.transcribe(pcm).await?;
        if text.trim().is_empty() {
            return Ok(());
        }
        tracing::debug!(room = %self.room_session.room_name(), from, "transcribed user audio");
        self.handle_user_turn(&text).await
    }

    /// Enforces the agent-lock policy: a switch is accepted only if it
    /// targets the configured primary agent's id and name. Rejected
    /// switches are announced to the user instead of changing any state.
    async fn switch_agent(&self, agent_id: String, agent_name: String) -> Result<(), VoiceError> {
        if agent_id != self.primary_agent.id || agent_name != self.primary_agent.name {
            let message = format!("Locked to {}", self.primary_agent.name);
            tracing::info!(
                room = %self.room_session.room_name(),
                requested_name = %agent_name,
                requested_id = %agent_id,
                "agent switch rejected by lock policy"
            );
            return self
                .room_session
                .publish_data(&ServerMessage::AgentSwitchRejected { message }.to_json_bytes(), true)
                .await
                .map_err(VoiceError::from);
        }

        self.room_session
            .publish_data(&ServerMessage::AgentSwitched { agent_id }.to_json_bytes(), true)
            .await
            .map_err(VoiceError::from)
    }

    async fn handle_user_turn(&self, text: &str) -> Result<(), VoiceError> {
        self.publish_transcript(TranscriptRole::User, text).await?;

        self.request_in_flight.store(true, Ordering::Release);
        let result = self.llm_node.handle_turn(&self.instance, self.mode, text).await;
        self.request_in_flight.store(false, Ordering::Release);

        match result? {
            Some(reply) => {
                let fingerprint = RequestFingerprint::compute(text, self.instance.agent_id());
                self.publish_assistant_reply(&reply, &fingerprint).await
            }
            None => Ok(()), // duplicate in-flight request, suppressed
        }
    }

    /// Publishes the assistant's reply as both a transcript (for the
    /// browser's UI) and synthesized audio (if a TTS provider is
    /// configured). The debug prefix — last 8 chars of `agent_id` plus the
    /// fingerprint suffix — is part of the published reply itself, for
    /// field debugging.
    async fn publish_assistant_reply(
        &self,
        reply: &str,
        fingerprint: &RequestFingerprint,
    ) -> Result<(), VoiceError> {
        let published = if self.debug_transcripts {
            let agent_suffix = tail(self.instance.agent_id(), 8);
            format!("[DEBUG: {agent_suffix}/{}] {reply}", fingerprint.suffix(6))
        } else {
            reply.to_string()
        };

        self.publish_transcript(TranscriptRole::Assistant, &published).await?;
        self.speak(&published).await
    }

    async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        if let Some(tts) = &self.tts {
            let pcm = tts.synthesize(text).await?;
            self.room_session.publish_audio(&pcm).await?;
        }
        Ok(())
    }

    async fn publish_transcript(&self, role: TranscriptRole, text: &str) -> Result<(), VoiceError> {
        self.room_session
            .publish_data(
                &ServerMessage::Transcript {
                    role,
                    text: text.to_string(),
                }
                .to_json_bytes(),
                true,
            )
            .await
            .map_err(VoiceError::from)
    }
}

/// Returns the last `n` characters of `s` (or all of it, if shorter).
fn tail(s: &str, n: usize) -> &str {
    let start = s.len().saturating_sub(n.min(s.len()));
    &s[start..]
}

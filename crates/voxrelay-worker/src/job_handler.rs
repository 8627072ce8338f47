//! Accepts or rejects incoming `JobRequest`s and stands up a
//! `VoiceAssistant` for every room this worker takes on.

use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use voxrelay_agentsvc::AgentServiceClient;
use voxrelay_fabric::{room::looks_like_agent_identity, Fabric, FabricError, JobRequest, WorkerTransport};
use voxrelay_voice::providers::{SttProvider, TtsProvider};
use voxrelay_voice::{LlmMode, LlmNode, PrimaryAgent, VoiceAssistant};

/// Tunables for the job handler that come from worker configuration rather
/// than being rediscovered per job.
#[derive(Debug, Clone)]
pub struct JobHandlerConfig {
    pub primary_agent_id: String,
    pub primary_agent_name: String,
    pub llm_mode: LlmMode,
    pub idle_timeout: Duration,
    pub debug_transcripts: bool,
}

pub struct JobHandler {
    registry: Arc<Registry>,
    fabric: Arc<dyn Fabric>,
    transport: Arc<dyn WorkerTransport>,
    agent_client: Arc<AgentServiceClient>,
    llm_node: Arc<LlmNode>,
    stt: Option<Arc<dyn SttProvider>>,
    tts: Option<Arc<dyn TtsProvider>>,
    config: JobHandlerConfig,
}

impl JobHandler {
    pub fn new(
        registry: Arc<Registry>,
        fabric: Arc<dyn Fabric>,
        transport: Arc<dyn WorkerTransport>,
        agent_client: Arc<AgentServiceClient>,
        llm_node: Arc<LlmNode>,
        config: JobHandlerConfig,
    ) -> Self {
        Self {
            registry,
            fabric,
            transport,
            agent_client,
            llm_node,
            stt: None,
            tts: None,
            config,
        }
    }

    /// Attaches the speech-to-text provider every spawned `VoiceAssistant`
    /// uses. Without one, `handle_audio` is a silent no-op (spec leaves STT
    /// provider selection to configuration).
    pub fn with_stt(mut self, stt: Arc<dyn SttProvider>) -> Self {
        self.stt = Some(stt);
        self
    }

    /// Attaches the text-to-speech provider every spawned `VoiceAssistant`
    /// uses. Without one, replies are published as transcripts only.
    pub fn with_tts(mut self, tts: Arc<dyn TtsProvider>) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Accepts or rejects `job` and, on acceptance, spawns its
    /// `VoiceAssistant` loop.
    pub async fn handle(&self, job: JobRequest) {
        if self.registry.agent_for_room(&job.room_name).is_some() {
            tracing::info!(room = %job.room_name, "room already served, rejecting duplicate job");
            self.reject(&job).await;
            return;
        }

        if let Err(e) = self.ensure_clean_room(&job.room_name).await {
            tracing::warn!(room = %job.room_name, error = %e, "failed to clean room before accept");
            self.reject(&job).await;
            return;
        }

        let session = match self.transport.accept(&job).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(room = %job.room_name, error = %e, "failed to accept job");
                return;
            }
        };

        let agent_id = self.config.primary_agent_id.clone();
        let (instance, was_new) = self.registry.acquire_instance(&agent_id);
        if !was_new {
            instance.reset_for_reconnect();
        }
        self.registry.assign_room(&job.room_name, &agent_id);

        if !instance.is_memory_loaded() {
            if let Err(e) = instance.load_memory(&self.agent_client).await {
                tracing::warn!(agent_id = %agent_id, error = %e, "failed to load agent memory, proceeding with defaults");
            }
        }

        let primary_agent = PrimaryAgent {
            id: self.config.primary_agent_id.clone(),
            name: self.config.primary_agent_name.clone(),
        };
        let mut assistant =
            VoiceAssistant::new(instance, session, self.llm_node.clone(), self.config.llm_mode, primary_agent)
                .with_idle_timeout(self.config.idle_timeout)
                .with_debug_transcripts(self.config.debug_transcripts);
        if let Some(stt) = &self.stt {
            assistant = assistant.with_stt(stt.clone());
        }
        if let Some(tts) = &self.tts {
            assistant = assistant.with_tts(tts.clone());
        }

        // `audio_enabled` has no default: TTS is silently disabled unless
        // this is explicitly true, which it is whenever a TTS provider is
        // configured.
        assistant.start(true, self.tts.is_some());

        let registry = self.registry.clone();
        let room_name = job.room_name.clone();
        tracing::info!(room = %room_name, agent_id = %agent_id, "accepted job, starting voice assistant");
        tokio::spawn(async move {
            assistant.run().await;
            registry.unassign_room(&room_name);
        });
    }

    async fn reject(&self, job: &JobRequest) {
        if let Err(e) = self.transport.reject(job).await {
            tracing::warn!(room = %job.room_name, error = %e, "failed to reject job");
        }
    }

    /// Removes any stray agent-identity participants left behind by a
    /// previously crashed worker, so the new `VoiceAssistant` doesn't
    /// compete with a ghost session in the same room.
    async fn ensure_clean_room(&self, room_name: &str) -> Result<(), FabricError> {
        let participants = self.fabric.list_participants(room_name).await?;
        for participant in participants {
            if looks_like_agent_identity(&participant.identity) {
                tracing::info!(room = %room_name, identity = %participant.identity, "removing stale agent participant");
                self.fabric
                    .remove_participant(room_name, &participant.identity)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::sync::Mutex as StdMutex;
    use voxrelay_fabric::{OutputOptions, ParticipantInfo, RoomEvent, RoomInfo, RoomSession};
    use voxrelay_types::ChatMessage;
    use voxrelay_voice::providers::LlmProvider;
    use voxrelay_voice::VoiceError;

    struct FakeFabric {
        participants: Vec<ParticipantInfo>,
        removed: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Fabric for FakeFabric {
        async fn list_rooms(&self) -> Result<Vec<RoomInfo>, FabricError> {
            Ok(Vec::new())
        }
        async fn list_participants(&self, _room: &str) -> Result<Vec<ParticipantInfo>, FabricError> {
            Ok(self.participants.clone())
        }
        async fn remove_participant(&self, _room: &str, identity: &str) -> Result<(), FabricError> {
            self.removed.lock().unwrap().push(identity.to_string());
            Ok(())
        }
        async fn delete_room(&self, _room: &str) -> Result<(), FabricError> {
            Ok(())
        }
        async fn create_dispatch(&self, _room: &str, _agent_name: &str) -> Result<String, FabricError> {
            Ok("dispatch-1".to_string())
        }
        fn generate_join_token(
            &self,
            _room: &str,
            _identity: &str,
            _display_name: &str,
            _ttl: Duration,
        ) -> Result<String, FabricError> {
            Ok("token".to_string())
        }
    }

    struct FakeRoomSession {
        name: String,
    }

    #[async_trait]
    impl RoomSession for FakeRoomSession {
        fn room_name(&self) -> &str {
            &self.name
        }
        async fn publish_data(&self, _bytes: &[u8], _reliable: bool) -> Result<(), FabricError> {
            Ok(())
        }
        async fn publish_audio(&self, _pcm: &[u8]) -> Result<(), FabricError> {
            Ok(())
        }
        async fn next_event(&self) -> Option<RoomEvent> {
            None
        }
        fn human_participant_count(&self) -> usize {
            0
        }
        fn start(&self, _options: OutputOptions) {}
    }

    struct FakeTransport {
        accepted: StdMutex<Vec<String>>,
        rejected: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkerTransport for FakeTransport {
        async fn register(&self, _agent_name: &str) -> Result<(), FabricError> {
            Ok(())
        }
        async fn next_job_request(&self) -> Option<JobRequest> {
            None
        }
        async fn accept(&self, job: &JobRequest) -> Result<Box<dyn RoomSession>, FabricError> {
            self.accepted.lock().unwrap().push(job.room_name.clone());
            Ok(Box::new(FakeRoomSession {
                name: job.room_name.clone(),
            }))
        }
        async fn reject(&self, job: &JobRequest) -> Result<(), FabricError> {
            self.rejected.lock().unwrap().push(job.room_name.clone());
            Ok(())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn stream_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
        ) -> Result<BoxStream<'static, Result<String, VoiceError>>, VoiceError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(stream::iter(vec![Ok(format!("echo: {last}"))]).boxed())
        }
    }

    fn handler(fabric: FakeFabric, transport: Arc<FakeTransport>) -> (JobHandler, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let agent_client = Arc::new(AgentServiceClient::new("http://127.0.0.1:1"));
        let llm_node = Arc::new(LlmNode::new(Arc::new(EchoLlm), agent_client.clone(), "test-model"));
        let config = JobHandlerConfig {
            primary_agent_id: "agent-1".to_string(),
            primary_agent_name: "Ava".to_string(),
            llm_mode: LlmMode::Fast,
            idle_timeout: Duration::from_millis(50),
            debug_transcripts: false,
        };
        let handler = JobHandler::new(
            registry.clone(),
            Arc::new(fabric),
            transport,
            agent_client,
            llm_node,
            config,
        );
        (handler, registry)
    }

    #[tokio::test]
    async fn accepts_job_and_assigns_room() {
        let transport = Arc::new(FakeTransport {
            accepted: StdMutex::new(Vec::new()),
            rejected: StdMutex::new(Vec::new()),
        });
        let (handler, registry) = handler(
            FakeFabric {
                participants: Vec::new(),
                removed: StdMutex::new(Vec::new()),
            },
            transport.clone(),
        );

        handler.handle(JobRequest::new("room-1")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.accepted.lock().unwrap().as_slice(), ["room-1"]);
        assert_eq!(registry.agent_for_room("room-1"), Some("agent-1".to_string()));
    }

    #[tokio::test]
    async fn rejects_job_for_already_served_room() {
        let transport = Arc::new(FakeTransport {
            accepted: StdMutex::new(Vec::new()),
            rejected: StdMutex::new(Vec::new()),
        });
        let (handler, registry) = handler(
            FakeFabric {
                participants: Vec::new(),
                removed: StdMutex::new(Vec::new()),
            },
            transport.clone(),
        );
        registry.assign_room("room-1", "agent-1");

        handler.handle(JobRequest::new("room-1")).await;

        assert_eq!(transport.rejected.lock().unwrap().as_slice(), ["room-1"]);
        assert!(transport.accepted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn removes_stray_agent_participants_before_accepting() {
        let transport = Arc::new(FakeTransport {
            accepted: StdMutex::new(Vec::new()),
            rejected: StdMutex::new(Vec::new()),
        });
        let fabric = FakeFabric {
            participants: vec![
                ParticipantInfo {
                    identity: "voxrelay-worker-ghost".to_string(),
                    joined_at: 0,
                },
                ParticipantInfo {
                    identity: "human-1".to_string(),
                    joined_at: 0,
                },
            ],
            removed: StdMutex::new(Vec::new()),
        };
        let (handler, _registry) = handler(fabric, transport.clone());

        handler.handle(JobRequest::new("room-2")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.accepted.lock().unwrap().as_slice(), ["room-2"]);
    }
}

//! The voice assistant: agent memory/instance state, the hybrid LLM node,
//! the data-channel protocol, and the per-room assistant loop that ties
//! them to a fabric room session.

pub mod assistant;
pub mod data_channel;
pub mod error;
pub mod instance;
pub mod llm_node;
pub mod providers;

pub use assistant::{PrimaryAgent, VoiceAssistant, DEFAULT_IDLE_TIMEOUT_SECONDS};
pub use data_channel::{ClientMessage, ServerMessage, TranscriptRole};
pub use error::VoiceError;
pub use instance::{AgentInstance, DedupOutcome};
pub use llm_node::{LlmMode, LlmNode};
pub use providers::{HttpLlmProvider, LlmProvider, SttProvider, SubprocessSttProvider, SubprocessTtsProvider, TtsProvider};

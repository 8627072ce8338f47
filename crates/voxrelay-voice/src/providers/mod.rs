//! Streaming-client traits for the external STT/LLM/TTS providers, plus
//! the concrete implementations that back them in production.
//!
//! The traits exist so `LlmNode` and `VoiceAssistant` can be exercised in
//! tests against fakes, following the same "trait at the seam, fake in
//! tests" convention the fabric crate uses for `Fabric`.

pub mod http_llm;
pub mod subprocess;

pub use http_llm::HttpLlmProvider;
pub use subprocess::{SubprocessSttProvider, SubprocessTtsProvider};

use crate::error::VoiceError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use voxrelay_types::ChatMessage;

/// Streams a completion for `messages`, yielding incremental text chunks.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String, VoiceError>>, VoiceError>;
}

/// Transcribes a single utterance of raw audio.
#[async_trait]
pub trait SttProvider: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

/// Synthesizes speech audio for a block of reply text.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

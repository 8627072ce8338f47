//! The hybrid LLM node: a fast path that streams directly from the LLM
//! provider (mirroring the turn to the stateful agent service in the
//! background, off the voice turn's critical path) and a slow path that
//! streams from the stateful agent service itself, guarded by the
//! reliability shell.

use crate::error::VoiceError;
use crate::instance::{AgentInstance, DedupOutcome};
use crate::providers::LlmProvider;
use futures::StreamExt;
use std::sync::Arc;
use voxrelay_agentsvc::AgentServiceClient;
use voxrelay_reliability::circuit_breaker::CallPermit;
use voxrelay_reliability::{fallback_reply, is_valid_response, retry_with_backoff, FallbackReason, RetryConfig};
use voxrelay_types::{ChatMessage, RequestFingerprint};

/// Which path serves a given turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMode {
    /// Stream directly from the LLM provider; mirror to the stateful agent
    /// service asynchronously.
    Fast,
    /// Stream from the stateful agent service directly, retried and
    /// circuit-breaker guarded.
    Stateful,
}

pub struct LlmNode {
    llm: Arc<dyn LlmProvider>,
    agent_client: Arc<AgentServiceClient>,
    model: String,
    retry_config: RetryConfig,
}

impl LlmNode {
    pub fn new(llm: Arc<dyn LlmProvider>, agent_client: Arc<AgentServiceClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            agent_client,
            model: model.into(),
            retry_config: RetryConfig::default(),
        }
    }

    /// Handles one user turn for `instance`. Returns `Ok(None)` when the
    /// turn is a duplicate of an in-flight request and should be silently
    /// dropped (the original request's reply will still be published).
    pub async fn handle_turn(
        &self,
        instance: &AgentInstance,
        mode: LlmMode,
        user_text: &str,
    ) -> Result<Option<String>, VoiceError> {
        let fingerprint = RequestFingerprint::compute(user_text, instance.agent_id());

        match instance.begin_request(&fingerprint) {
            DedupOutcome::Cached(text) => return Ok(Some(text)),
            DedupOutcome::InFlight => return Ok(None),
            DedupOutcome::Fresh => {}
        }

        let reply = match mode {
            LlmMode::Fast => self.run_fast_path(instance, user_text).await,
            LlmMode::Stateful => self.run_stateful_path(instance, user_text).await,
        };

        let reply = match reply {
            Ok(text) if is_valid_response(&text) => text,
            Ok(_) => fallback_reply(FallbackReason::Unknown),
            Err(_) => fallback_reply(FallbackReason::Unknown),
        };

        instance.push_history(ChatMessage::user(user_text));
        instance.push_history(ChatMessage::assistant(reply.clone()));
        instance.complete_request(fingerprint, Some(reply.clone()));

        Ok(Some(reply))
    }

    async fn run_fast_path(&self, instance: &AgentInstance, user_text: &str) -> Result<String, VoiceError> {
        if !instance.is_memory_loaded() {
            if let Err(e) = instance.load_memory(&self.agent_client).await {
                tracing::warn!(error = %e, agent_id = %instance.agent_id(), "memory load failed, using base instructions");
            }
        }

        let mut messages = vec![ChatMessage::system(instance.system_instructions())];
        messages.extend(instance.history_snapshot());
        messages.push(ChatMessage::user(user_text));

        let mut stream = self.llm.stream_completion(&self.model, &messages).await?;
        let mut accumulated = String::new();
        while let Some(chunk) = stream.next().await {
            accumulated.push_str(&chunk?);
        }

        let agent_client = self.agent_client.clone();
        let agent_id = instance.agent_id().to_string();
        let log_agent_id = agent_id.clone();
        let mirrored_user = user_text.to_string();
        let mirrored_reply = accumulated.clone();
        let mirror_retry = self.retry_config;
        let handle = tokio::spawn(async move {
            let result = retry_with_backoff(mirror_retry, move || {
                let agent_client = agent_client.clone();
                let agent_id = agent_id.clone();
                let mirrored_user = mirrored_user.clone();
                let mirrored_reply = mirrored_reply.clone();
                async move { agent_client.mirror_turn(&agent_id, &mirrored_user, &mirrored_reply).await }
            })
            .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, agent_id = %log_agent_id, "memory mirror failed after retries");
            }
        });
        instance.track_background_task(handle);

        Ok(accumulated)
    }

    async fn run_stateful_path(&self, instance: &AgentInstance, user_text: &str) -> Result<String, VoiceError> {
        let breaker = instance.circuit_breaker();
        match breaker.before_call() {
            CallPermit::Denied => {
                return Ok(fallback_reply(FallbackReason::LettaDown));
            }
            CallPermit::Allowed | CallPermit::Trial => {}
        }

        // A failed health check short-circuits straight to fallback and
        // counts against the breaker the same as a failed call would.
        if self.agent_client.health_check().await.is_err() {
            breaker.on_failure();
            return Ok(fallback_reply(FallbackReason::LettaDown));
        }

        let client = self.agent_client.clone();
        let agent_id = instance.agent_id().to_string();
        let text = user_text.to_string();
        let result = retry_with_backoff(self.retry_config, move || {
            let client = client.clone();
            let agent_id = agent_id.clone();
            let text = text.clone();
            async move { client.stream_message(&agent_id, &text).await }
        })
        .await;

        match result {
            Ok(reply) => {
                breaker.on_success();
                Ok(reply)
            }
            Err(_) => {
                breaker.on_failure();
                Ok(fallback_reply(FallbackReason::LlmTimeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LlmProvider;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};

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

    #[tokio::test]
    async fn fast_path_returns_llm_output_and_dedupes() {
        let instance = AgentInstance::new("agent-1");
        let node = LlmNode::new(
            Arc::new(EchoLlm),
            Arc::new(AgentServiceClient::new("http://127.0.0.1:1")),
            "test-model",
        );

        let first = node
            .handle_turn(&instance, LlmMode::Fast, "hello there")
            .await
            .unwrap();
        assert_eq!(first, Some("echo: hello there".to_string()));

        // Same fingerprint again, now cached.
        let second = node
            .handle_turn(&instance, LlmMode::Fast, "hello there")
            .await
            .unwrap();
        assert_eq!(second, Some("echo: hello there".to_string()));
    }

    #[tokio::test]
    async fn stateful_path_falls_back_when_circuit_open() {
        let instance = AgentInstance::new("agent-1");
        for _ in 0..3 {
            instance.circuit_breaker().on_failure();
        }
        let node = LlmNode::new(
            Arc::new(EchoLlm),
            Arc::new(AgentServiceClient::new("http://127.0.0.1:1")),
            "test-model",
        );

        let reply = node
            .handle_turn(&instance, LlmMode::Stateful, "are you there")
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("memory"));
    }
}

//! HTTP client for the stateful agent/memory service.

use crate::error::AgentSvcError;
use crate::stream::{accumulate_assistant_text, parse_ndjson_chunks};
use futures::StreamExt;
use std::time::Duration;
use voxrelay_types::AgentRecord;

/// Timeout for `GET /v1/agents/{id}`, used by `AgentInstance::load_memory`.
const MEMORY_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the health endpoint.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// A client for the stateful agent service's REST and streaming APIs.
///
/// Bypasses the provider's own streaming SDK deliberately: that SDK's agent
/// retrieval returns an empty `memory.blocks` for this schema, an external
/// contract quirk worked around by always hitting the REST endpoint
/// directly for persona/memory loading.
#[derive(Debug, Clone)]
pub struct AgentServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl AgentServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// `GET /v1/agents/{id}` — the authoritative source for persona/memory.
    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord, AgentSvcError> {
        let url = format!("{}/v1/agents/{}", self.base_url, agent_id);
        let response = tokio::time::timeout(MEMORY_LOAD_TIMEOUT, self.http.get(&url).send())
            .await
            .map_err(|_| AgentSvcError::Timeout)??;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentSvcError::NotFound(agent_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(AgentSvcError::UpstreamStatus(response.status()));
        }

        let body = tokio::time::timeout(MEMORY_LOAD_TIMEOUT, response.text())
            .await
            .map_err(|_| AgentSvcError::Timeout)??;

        Ok(serde_json::from_str(&body)?)
    }

    /// `GET /v1/agents` — used at worker startup to resolve a primary
    /// agent name to its id when `PRIMARY_AGENT_ID` is not configured
    /// directly.
    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>, AgentSvcError> {
        let url = format!("{}/v1/agents", self.base_url);
        let response = tokio::time::timeout(MEMORY_LOAD_TIMEOUT, self.http.get(&url).send())
            .await
            .map_err(|_| AgentSvcError::Timeout)??;

        if !response.status().is_success() {
            return Err(AgentSvcError::UpstreamStatus(response.status()));
        }

        let body = tokio::time::timeout(MEMORY_LOAD_TIMEOUT, response.text())
            .await
            .map_err(|_| AgentSvcError::Timeout)??;

        Ok(serde_json::from_str(&body)?)
    }

    /// Cheap liveness probe, used before any slow-path call.
    pub async fn health_check(&self) -> Result<(), AgentSvcError> {
        let url = format!("{}/health", self.base_url);
        let response = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.http.get(&url).send())
            .await
            .map_err(|_| AgentSvcError::Timeout)??;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AgentSvcError::UpstreamStatus(response.status()))
        }
    }

    /// Streams `POST /v1/agents/{id}/messages` and accumulates the
    /// assistant's reply text across all `assistant_message` chunks.
    ///
    /// Used by the slow path (stateful mode). Callers are expected to wrap
    /// this in `voxrelay_reliability::retry_with_backoff` for slow-path
    /// use; this method itself performs a single streaming attempt.
    pub async fn stream_message(
        &self,
        agent_id: &str,
        user_message: &str,
    ) -> Result<String, AgentSvcError> {
        let url = format!("{}/v1/agents/{}/messages", self.base_url, agent_id);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "message": user_message }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgentSvcError::UpstreamStatus(response.status()));
        }

        let mut body_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();

        while let Some(next) = body_stream.next().await {
            let bytes = next?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            let (chunks, consumed) = parse_ndjson_chunks(&buffer);
            accumulated.push_str(&accumulate_assistant_text(&chunks));
            buffer.drain(..consumed);
        }

        Ok(accumulated)
    }

    /// Mirrors a completed fast-path turn (both the user message and the
    /// reply already spoken to the user) into the stateful agent service's
    /// own conversation history, so its long-term memory stays in sync
    /// without regenerating a reply of its own. The response body, if any,
    /// is discarded — this call exists purely to update upstream memory,
    /// not to produce a spoken reply.
    pub async fn mirror_turn(
        &self,
        agent_id: &str,
        user_message: &str,
        assistant_reply: &str,
    ) -> Result<(), AgentSvcError> {
        let url = format!("{}/v1/agents/{}/messages", self.base_url, agent_id);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "message": user_message,
                "assistant_reply": assistant_reply,
                "mirror_only": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgentSvcError::UpstreamStatus(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_fails_fast_against_unreachable_host() {
        let client = AgentServiceClient::new("http://127.0.0.1:1");
        let result = client.health_check().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_agent_against_unreachable_host_is_an_error_not_a_panic() {
        let client = AgentServiceClient::new("http://127.0.0.1:1");
        let result = client.get_agent("agent-1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_agents_against_unreachable_host_is_an_error_not_a_panic() {
        let client = AgentServiceClient::new("http://127.0.0.1:1");
        let result = client.list_agents().await;
        assert!(result.is_err());
    }
}

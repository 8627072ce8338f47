//! An OpenAI-compatible chat-completions streaming client.
//!
//! Talks to any provider exposing the `POST {base_url}/chat/completions`
//! surface (OpenAI itself, or a locally hosted vLLM/Ollama-style gateway)
//! with `stream: true` and parses the server-sent-events wire format one
//! line at a time, the same `choices[0].delta.content` shape used across
//! OpenAI-compatible providers.

use crate::error::VoiceError;
use crate::providers::LlmProvider;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use voxrelay_types::{ChatMessage, Role};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SSE_DONE_MARKER: &str = "[DONE]";

/// Streaming client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpLlmProvider {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    fn wire_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String, VoiceError>>, VoiceError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "messages": Self::wire_messages(messages),
            "stream": true,
        });

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(CONNECT_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VoiceError::ProviderStatus(response.status()));
        }

        let byte_stream = response.bytes_stream();
        let stream = byte_stream
            .scan(String::new(), |buffer, chunk| {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => return futures::future::ready(Some(vec![Err(VoiceError::from(e))])),
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                let mut out = Vec::new();
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline);
                    if let Some(piece) = parse_sse_line(&line) {
                        out.push(piece);
                    }
                }
                futures::future::ready(Some(out))
            })
            .flat_map(futures::stream::iter);

        Ok(stream.boxed())
    }
}

/// Parses one line of an OpenAI-style SSE stream, returning the delta text
/// if the line carries one. Non-`data:` lines and the terminal `[DONE]`
/// marker yield `None`.
fn parse_sse_line(line: &str) -> Option<Result<String, VoiceError>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == SSE_DONE_MARKER {
        return None;
    }

    let parsed: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => return Some(Err(VoiceError::MalformedMessage(e))),
    };

    let content = parsed
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or("");

    if content.is_empty() {
        None
    } else {
        Some(Ok(content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().unwrap(), "hel");
    }

    #[test]
    fn ignores_done_marker() {
        assert!(parse_sse_line("data: [DONE]").is_none());
    }

    #[test]
    fn ignores_empty_delta() {
        let line = r#"data: {"choices":[{"delta":{}}]}"#;
        assert!(parse_sse_line(line).is_none());
    }

    #[test]
    fn ignores_non_data_lines() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("").is_none());
    }

    #[test]
    fn surfaces_malformed_json_as_error() {
        let line = "data: {not json";
        assert!(matches!(
            parse_sse_line(line),
            Some(Err(VoiceError::MalformedMessage(_)))
        ));
    }
}

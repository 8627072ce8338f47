//! Parsing for the stateful agent service's streaming messages API.
//!
//! The upstream stream is newline-delimited JSON objects; only chunks of
//! type `assistant_message` contribute to the accumulated reply.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantChunk {
    pub message_type: String,
    #[serde(default)]
    pub content: String,
}

impl AssistantChunk {
    pub fn is_assistant_message(&self) -> bool {
        self.message_type == "assistant_message"
    }
}

/// Parses a buffer of newline-delimited JSON stream chunks, returning the
/// chunks successfully decoded and the number of bytes consumed from the
/// front of `buf` (a partial trailing line, if any, is left unconsumed for
/// the next read).
pub fn parse_ndjson_chunks(buf: &str) -> (Vec<AssistantChunk>, usize) {
    let mut chunks = Vec::new();
    let mut consumed = 0usize;

    for line in buf.split_inclusive('\n') {
        if !line.ends_with('\n') {
            // Partial trailing line; leave it for the next read.
            break;
        }
        consumed += line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AssistantChunk>(trimmed) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                tracing::warn!(error = %e, line = %trimmed, "skipping malformed stream chunk");
            }
        }
    }

    (chunks, consumed)
}

/// Accumulates the `content` of every `assistant_message` chunk, in order.
pub fn accumulate_assistant_text(chunks: &[AssistantChunk]) -> String {
    chunks
        .iter()
        .filter(|c| c.is_assistant_message())
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .concat()
}

//! The JSON data-channel protocol exchanged between a room participant's
//! client and the voice assistant.

use serde::{Deserialize, Serialize};

/// Messages received from a room participant over the reliable data channel.
///
/// Any `type` not recognized here is silently ignored by the assistant loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Requests the instance switch to serving a different agent for this
    /// room. Fed through the agent-lock policy; almost always rejected
    /// outside of the configured primary agent.
    AgentSelection { agent_id: String, agent_name: String },
    /// Requests a graceful shutdown of this session: disconnect from the
    /// room and release the room assignment. The instance remains
    /// available for re-acquisition.
    RoomCleanup,
    /// A typed (non-voice) user message, handled the same as a transcribed
    /// utterance.
    UserText { text: String },
}

/// The role a transcript entry is attributed to.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// Messages published to the room over the reliable data channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Transcript {
        role: TranscriptRole,
        text: String,
    },
    AgentSwitched {
        agent_id: String,
    },
    /// Sent when a requested agent switch is rejected by the agent lock:
    /// announced to the user, not treated as an error state.
    AgentSwitchRejected {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("ServerMessage always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_selection() {
        let raw = r#"{"type":"agent_selection","agent_id":"agent-2","agent_name":"OtherAgent"}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::AgentSelection { agent_id, agent_name }
                if agent_id == "agent-2" && agent_name == "OtherAgent"
        ));
    }

    #[test]
    fn parses_room_cleanup() {
        let raw = r#"{"type":"room_cleanup"}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, ClientMessage::RoomCleanup));
    }

    #[test]
    fn parses_user_text() {
        let raw = r#"{"type":"user_text","text":"hello there"}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, ClientMessage::UserText { text } if text == "hello there"));
    }

    #[test]
    fn unknown_type_fails_to_parse_and_is_ignored_by_caller() {
        let raw = r#"{"type":"something_else"}"#;
        let parsed: Result<ClientMessage, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn transcript_round_trips_with_role() {
        let msg = ServerMessage::Transcript {
            role: TranscriptRole::Assistant,
            text: "hi".to_string(),
        };
        let bytes = msg.to_json_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "transcript");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["text"], "hi");
    }
}

//! The agent record as returned by the stateful agent/memory service.
//!
//! The REST representation (`GET /v1/agents/{id}`) is authoritative for
//! persona and memory; the streaming SDK representation of the same agent
//! may return an empty block list and must never be used for persona
//! loading (see `voxrelay-agentsvc`).

use serde::{Deserialize, Serialize};

/// A single named block of an agent's long-term memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub label: String,
    pub value: String,
}

/// Well-known memory block labels, in persona-selection precedence order.
pub enum MemoryLabel {}

impl MemoryLabel {
    pub const PERSONA: &'static str = "persona";
    pub const HUMAN: &'static str = "human";
    pub const ROLE: &'static str = "role";
    pub const WORKSPACE: &'static str = "workspace";
    pub const TASK_HISTORY: &'static str = "task_history";

    /// Precedence order for selecting a single persona string: `persona` >
    /// `human` > `role`.
    pub const PERSONA_PRECEDENCE: [&'static str; 3] = [Self::PERSONA, Self::HUMAN, Self::ROLE];
}

/// An agent's memory, as returned by the REST agent endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMemory {
    #[serde(default)]
    pub blocks: Vec<MemoryBlock>,
}

/// The external agent entity, consumed via REST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub memory: AgentMemory,
}

impl AgentRecord {
    /// Builds the `label -> value` map used by `AgentInstance::memory_blocks`.
    ///
    /// When multiple blocks share a label, the last one wins, in the
    /// insertion order returned by the service.
    pub fn memory_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        for block in &self.memory.blocks {
            map.insert(block.label.clone(), block.value.clone());
        }
        map
    }

    /// Selects the persona string: the first non-empty block among
    /// `persona`, `human`, `role`, in that precedence order; otherwise empty.
    pub fn select_persona(&self) -> String {
        let map = self.memory_map();
        for label in MemoryLabel::PERSONA_PRECEDENCE {
            if let Some(value) = map.get(label) {
                if !value.trim().is_empty() {
                    return value.clone();
                }
            }
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(label: &str, value: &str) -> MemoryBlock {
        MemoryBlock {
            label: label.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn persona_precedence_prefers_persona_block() {
        let rec = AgentRecord {
            id: "a1".into(),
            name: "Ava".into(),
            memory: AgentMemory {
                blocks: vec![
                    block("human", "the user is a pilot"),
                    block("persona", "You are Ava, a calm co-pilot."),
                    block("role", "assistant"),
                ],
            },
        };
        assert_eq!(rec.select_persona(), "You are Ava, a calm co-pilot.");
    }

    #[test]
    fn persona_falls_back_to_human_then_role() {
        let only_role = AgentRecord {
            id: "a1".into(),
            name: "Ava".into(),
            memory: AgentMemory {
                blocks: vec![block("role", "a concise assistant")],
            },
        };
        assert_eq!(only_role.select_persona(), "a concise assistant");

        let empty_persona = AgentRecord {
            id: "a1".into(),
            name: "Ava".into(),
            memory: AgentMemory {
                blocks: vec![
                    block("persona", "   "),
                    block("human", "prefers short answers"),
                ],
            },
        };
        assert_eq!(empty_persona.select_persona(), "prefers short answers");
    }

    #[test]
    fn persona_empty_when_no_blocks_match() {
        let rec = AgentRecord {
            id: "a1".into(),
            name: "Ava".into(),
            memory: AgentMemory {
                blocks: vec![block("workspace", "engineering")],
            },
        };
        assert_eq!(rec.select_persona(), "");
    }

    #[test]
    fn duplicate_labels_last_one_wins() {
        let rec = AgentRecord {
            id: "a1".into(),
            name: "Ava".into(),
            memory: AgentMemory {
                blocks: vec![
                    block("persona", "first version"),
                    block("persona", "second version"),
                ],
            },
        };
        assert_eq!(rec.select_persona(), "second version");
    }
}

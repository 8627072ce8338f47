//! Shared types for the voice agent orchestration layer.
//!
//! This crate provides the data model shared across the worker, HTTP
//! control plane, and the agent-service / reliability clients: the agent
//! record and its memory blocks, chat messages, request fingerprints, and
//! circuit-breaker state. No crate in the workspace depends on anything
//! *except* `voxrelay-types` for these cross-cutting definitions, mirroring
//! how the wider platform keeps its shared-types crate dependency-free.

pub mod agent;
pub mod circuit;
pub mod fingerprint;
pub mod message;

pub use agent::{AgentRecord, MemoryBlock, MemoryLabel};
pub use circuit::CircuitState;
pub use fingerprint::RequestFingerprint;
pub use message::{ChatMessage, Role};

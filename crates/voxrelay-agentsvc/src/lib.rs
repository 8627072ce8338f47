//! Client for the stateful agent/memory service.
//!
//! Exposes exactly the interface the core depends on (§6): fetching an
//! agent's REST record (authoritative for persona/memory), streaming the
//! messages API for the slow path and the background memory mirror, and a
//! cheap health check used by the reliability shell before any slow-path
//! call.

pub mod client;
pub mod error;
pub mod stream;

pub use client::AgentServiceClient;
pub use error::AgentSvcError;
pub use stream::AssistantChunk;

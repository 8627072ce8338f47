//! Abstraction over the WebRTC media-routing fabric (the room service).
//!
//! This crate defines the `Fabric` trait at the interface the core
//! orchestration layer consumes: room listing, participant management,
//! dispatch, and join-token minting. The only production implementation,
//! [`livekit::LiveKitFabric`], is backed by `livekit-api`/`livekit-protocol`
//! for room-service HTTP calls and access-token signing.

pub mod error;
pub mod job;
pub mod livekit;
pub mod room;
pub mod session;

pub use error::FabricError;
pub use job::JobRequest;
pub use room::{ParticipantInfo, RoomInfo};
pub use session::{OutputOptions, RoomEvent, RoomSession, WorkerTransport};

use async_trait::async_trait;

/// The fabric operations the core depends on. Kept small and trait-based
/// (per the platform's "pass singletons/collaborators explicitly, and keep
/// them testable" convention) so that worker and health-monitor logic can
/// be exercised against an in-memory fake.
#[async_trait]
pub trait Fabric: Send + Sync {
    async fn list_rooms(&self) -> Result<Vec<RoomInfo>, FabricError>;
    async fn list_participants(&self, room: &str) -> Result<Vec<ParticipantInfo>, FabricError>;
    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), FabricError>;
    async fn delete_room(&self, room: &str) -> Result<(), FabricError>;
    async fn create_dispatch(&self, room: &str, agent_name: &str) -> Result<String, FabricError>;
    fn generate_join_token(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
        ttl: std::time::Duration,
    ) -> Result<String, FabricError>;
}

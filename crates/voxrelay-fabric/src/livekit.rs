//! LiveKit-backed implementation of [`Fabric`].
//!
//! Room operations go through `livekit_api::services::room::RoomClient`
//! (HTTP Twirp RPC, signed with the server API key/secret). Dispatch goes
//! through `livekit_api::services::agent_dispatch::AgentDispatchClient`,
//! LiveKit's dedicated RPC for handing a room to a worker registered under
//! a well-known agent name. Join tokens are minted the same way the
//! platform's voice service did: `AccessToken` with `VideoGrants`.

use crate::error::FabricError;
use crate::room::{ParticipantInfo, RoomInfo};
use crate::Fabric;
use async_trait::async_trait;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::agent_dispatch::{AgentDispatchClient, CreateAgentDispatchOptions};
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use std::time::Duration;

/// Configuration for connecting to the LiveKit server.
#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

/// A `Fabric` implementation backed by a real LiveKit deployment.
pub struct LiveKitFabric {
    config: LiveKitConfig,
    room_client: RoomClient,
    dispatch_client: AgentDispatchClient,
}

impl LiveKitFabric {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        let dispatch_client =
            AgentDispatchClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
            dispatch_client,
        }
    }

    /// Ensures a room exists. `create_room` on an already-existing room is a
    /// harmless no-op from the fabric's perspective (idempotent by name).
    pub async fn ensure_room(&self, name: &str) -> Result<(), FabricError> {
        self.room_client
            .create_room(name, CreateRoomOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| FabricError::RoomService(e.to_string()))
    }
}

#[async_trait]
impl Fabric for LiveKitFabric {
    async fn list_rooms(&self) -> Result<Vec<RoomInfo>, FabricError> {
        let rooms = self
            .room_client
            .list_rooms(Vec::new())
            .await
            .map_err(|e| FabricError::RoomService(e.to_string()))?;

        Ok(rooms
            .into_iter()
            .map(|r| RoomInfo {
                name: r.name,
                num_participants: r.num_participants,
                created_at: r.creation_time,
            })
            .collect())
    }

    async fn list_participants(&self, room: &str) -> Result<Vec<ParticipantInfo>, FabricError> {
        let participants = self
            .room_client
            .list_participants(room)
            .await
            .map_err(|e| FabricError::RoomService(e.to_string()))?;

        Ok(participants
            .into_iter()
            .map(|p| ParticipantInfo {
                identity: p.identity,
                joined_at: p.joined_at,
            })
            .collect())
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), FabricError> {
        self.room_client
            .remove_participant(room, identity)
            .await
            .map_err(|e| FabricError::RoomService(e.to_string()))
    }

    async fn delete_room(&self, room: &str) -> Result<(), FabricError> {
        self.room_client
            .delete_room(room)
            .await
            .map_err(|e| FabricError::RoomService(e.to_string()))
    }

    async fn create_dispatch(&self, room: &str, agent_name: &str) -> Result<String, FabricError> {
        let dispatch = self
            .dispatch_client
            .create_dispatch(room, agent_name, CreateAgentDispatchOptions::default())
            .await
            .map_err(|e| FabricError::Dispatch(e.to_string()))?;

        Ok(dispatch.id)
    }

    fn generate_join_token(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
        ttl: Duration,
    ) -> Result<String, FabricError> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(identity)
            .with_name(display_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(ttl);

        Ok(token.to_jwt()?)
    }
}

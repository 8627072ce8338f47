//! The room & agent registry: which agent instance serves which room.
//!
//! Constructed once in `main` and shared via `Arc` with the job handler and
//! health monitor, following the platform's "pass singletons/collaborators
//! explicitly" convention already used for `AppState` in the HTTP control
//! plane.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use voxrelay_voice::AgentInstance;

#[derive(Default)]
pub struct Registry {
    instances: Mutex<HashMap<String, Arc<AgentInstance>>>,
    rooms: Mutex<HashMap<String, String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared instance for `agent_id`, creating it if this is
    /// the first room to need it. The second element of the return value
    /// is `false` when an existing instance was reused — callers must then
    /// call `AgentInstance::reset_for_reconnect` before serving a new room
    /// with it.
    pub fn acquire_instance(&self, agent_id: &str) -> (Arc<AgentInstance>, bool) {
        let mut instances = self.instances.lock().unwrap_or_else(|p| p.into_inner());
        match instances.entry(agent_id.to_string()) {
            std::collections::hash_map::Entry::Occupied(e) => (e.get().clone(), false),
            std::collections::hash_map::Entry::Vacant(e) => {
                let instance = Arc::new(AgentInstance::new(agent_id));
                e.insert(instance.clone());
                (instance, true)
            }
        }
    }

    /// Drops the cached instance for `agent_id` if no room currently
    /// references it. No-op otherwise.
    pub fn release_instance(&self, agent_id: &str) {
        let still_in_use = self
            .rooms
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .any(|a| a == agent_id);
        if !still_in_use {
            self.instances
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(agent_id);
        }
    }

    pub fn assign_room(&self, room_name: &str, agent_id: &str) {
        self.rooms
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(room_name.to_string(), agent_id.to_string());
    }

    /// Removes the room's assignment, returning the agent id it was
    /// assigned to, and releases that agent's instance if it is now unused.
    pub fn unassign_room(&self, room_name: &str) -> Option<String> {
        let agent_id = self
            .rooms
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(room_name);
        if let Some(agent_id) = &agent_id {
            self.release_instance(agent_id);
        }
        agent_id
    }

    pub fn agent_for_room(&self, room_name: &str) -> Option<String> {
        self.rooms
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(room_name)
            .cloned()
    }

    pub fn assigned_room_count(&self) -> usize {
        self.rooms.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn assigned_rooms_for_agent(&self, agent_id: &str) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(_, a)| a.as_str() == agent_id)
            .map(|(room, _)| room.clone())
            .collect()
    }
}

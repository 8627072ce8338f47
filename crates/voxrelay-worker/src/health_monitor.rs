//! The room health monitor: periodically scans the fabric for rooms with
//! waiting humans and no assigned agent, dispatching a worker to them, and
//! separately sweeps for stale empty rooms.
//!
//! Both loops follow the platform's pruning-task shape: sleep first, then
//! do the scan, with the scan's own cost never compounding the sleep
//! interval.

use crate::registry::Registry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use voxrelay_fabric::room::looks_like_agent_identity;
use voxrelay_fabric::Fabric;

/// A room with zero participants is deleted once it has been observed empty
/// for this long.
const DEFAULT_STALE_ROOM_THRESHOLD: Duration = Duration::from_secs(5 * 60);
/// An agent-identity participant left behind in a room with no humans is
/// removed once it has been present this long.
const DEFAULT_STALE_AGENT_PARTICIPANT_THRESHOLD: Duration = Duration::from_secs(10 * 60);

pub struct HealthMonitor {
    fabric: Arc<dyn Fabric>,
    registry: Arc<Registry>,
    worker_name: String,
    scan_interval: Duration,
    cooldown: Duration,
    stale_room_threshold: Duration,
    stale_agent_participant_threshold: Duration,
    last_dispatch: Mutex<HashMap<String, Instant>>,
    empty_since: Mutex<HashMap<String, Instant>>,
}

impl HealthMonitor {
    pub fn new(
        fabric: Arc<dyn Fabric>,
        registry: Arc<Registry>,
        worker_name: impl Into<String>,
        scan_interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            fabric,
            registry,
            worker_name: worker_name.into(),
            scan_interval,
            cooldown,
            stale_room_threshold: DEFAULT_STALE_ROOM_THRESHOLD,
            stale_agent_participant_threshold: DEFAULT_STALE_AGENT_PARTICIPANT_THRESHOLD,
            last_dispatch: Mutex::new(HashMap::new()),
            empty_since: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides how long a room must sit empty before it is deleted.
    /// Exposed for tests; production callers keep the default.
    pub fn with_stale_room_threshold(mut self, threshold: Duration) -> Self {
        self.stale_room_threshold = threshold;
        self
    }

    /// Overrides how long an agent-identity participant may linger in a
    /// human-free room before it is removed. Exposed for tests.
    pub fn with_stale_agent_participant_threshold(mut self, threshold: Duration) -> Self {
        self.stale_agent_participant_threshold = threshold;
        self
    }

    /// Runs the scan/dispatch loop forever.
    pub async fn run_scan_loop(&self) {
        tracing::info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            cooldown_secs = self.cooldown.as_secs(),
            "starting room health monitor"
        );
        loop {
            tokio::time::sleep(self.scan_interval).await;
            if let Err(e) = self.scan_once().await {
                tracing::error!(error = %e, "room health scan failed");
            }
        }
    }

    /// Runs the stale-room cleanup pass at process start and then on
    /// `interval` forever.
    pub async fn run_stale_cleanup_loop(&self, interval: Duration) {
        loop {
            if let Err(e) = self.stale_cleanup_once().await {
                tracing::error!(error = %e, "stale room cleanup failed");
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn scan_once(&self) -> Result<(), voxrelay_fabric::FabricError> {
        let rooms = self.fabric.list_rooms().await?;
        for room in rooms {
            if self.registry.agent_for_room(&room.name).is_some() {
                continue;
            }

            let participants = self.fabric.list_participants(&room.name).await?;
            let human_count = participants
                .iter()
                .filter(|p| !looks_like_agent_identity(&p.identity))
                .count();
            if human_count == 0 {
                continue;
            }

            if self.in_cooldown(&room.name) {
                continue;
            }

            match self.fabric.create_dispatch(&room.name, &self.worker_name).await {
                Ok(dispatch_id) => {
                    tracing::info!(room = %room.name, dispatch_id, "dispatched worker to unattended room");
                    self.mark_dispatched(&room.name);
                }
                Err(e) => {
                    tracing::warn!(room = %room.name, error = %e, "failed to create dispatch");
                }
            }
        }
        Ok(())
    }

    async fn stale_cleanup_once(&self) -> Result<(), voxrelay_fabric::FabricError> {
        let rooms = self.fabric.list_rooms().await?;
        let mut present = std::collections::HashSet::new();
        let mut deleted = 0u32;
        let mut agents_removed = 0u32;

        for room in &rooms {
            present.insert(room.name.clone());

            if room.num_participants == 0 && self.registry.agent_for_room(&room.name).is_none() {
                if self.mark_empty_and_check_stale(&room.name) {
                    self.fabric.delete_room(&room.name).await?;
                    deleted += 1;
                }
                continue;
            }
            self.clear_empty_since(&room.name);

            let participants = self.fabric.list_participants(&room.name).await?;
            let has_humans = participants.iter().any(|p| !looks_like_agent_identity(&p.identity));
            if has_humans {
                continue;
            }
            for participant in &participants {
                if looks_like_agent_identity(&participant.identity) && self.is_agent_participant_stale(participant.joined_at)
                {
                    tracing::info!(room = %room.name, identity = %participant.identity, "removing stale agent participant from human-free room");
                    self.fabric.remove_participant(&room.name, &participant.identity).await?;
                    agents_removed += 1;
                }
            }
        }

        self.forget_vanished_rooms(&present);

        if deleted > 0 {
            tracing::info!(count = deleted, "deleted stale empty rooms");
        }
        if agents_removed > 0 {
            tracing::info!(count = agents_removed, "removed stale agent participants");
        }
        Ok(())
    }

    /// Records that `room_name` was observed empty on this pass and reports
    /// whether it has now been empty for at least `stale_room_threshold`.
    fn mark_empty_and_check_stale(&self, room_name: &str) -> bool {
        let mut empty_since = self.empty_since.lock().unwrap_or_else(|p| p.into_inner());
        let first_seen = *empty_since.entry(room_name.to_string()).or_insert_with(Instant::now);
        first_seen.elapsed() >= self.stale_room_threshold
    }

    fn clear_empty_since(&self, room_name: &str) {
        self.empty_since.lock().unwrap_or_else(|p| p.into_inner()).remove(room_name);
    }

    /// Drops tracking state for rooms that no longer exist, so a deleted
    /// room's name can't linger in memory indefinitely.
    fn forget_vanished_rooms(&self, present: &std::collections::HashSet<String>) {
        self.empty_since
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|room, _| present.contains(room));
    }

    fn is_agent_participant_stale(&self, joined_at: i64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let age_secs = now.saturating_sub(joined_at);
        age_secs >= self.stale_agent_participant_threshold.as_secs() as i64
    }

    fn in_cooldown(&self, room_name: &str) -> bool {
        let last = self.last_dispatch.lock().unwrap_or_else(|p| p.into_inner());
        match last.get(room_name) {
            Some(t) => t.elapsed() < self.cooldown,
            None => false,
        }
    }

    fn mark_dispatched(&self, room_name: &str) {
        self.last_dispatch
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(room_name.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use voxrelay_fabric::{FabricError, ParticipantInfo, RoomInfo};

    struct FakeFabric {
        rooms: Vec<RoomInfo>,
        participants: HashMap<String, Vec<ParticipantInfo>>,
        dispatches: StdMutex<Vec<String>>,
        deleted: StdMutex<Vec<String>>,
        removed: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Fabric for FakeFabric {
        async fn list_rooms(&self) -> Result<Vec<RoomInfo>, FabricError> {
            Ok(self.rooms.clone())
        }
        async fn list_participants(&self, room: &str) -> Result<Vec<ParticipantInfo>, FabricError> {
            Ok(self.participants.get(room).cloned().unwrap_or_default())
        }
        async fn remove_participant(&self, _room: &str, identity: &str) -> Result<(), FabricError> {
            self.removed.lock().unwrap().push(identity.to_string());
            Ok(())
        }
        async fn delete_room(&self, room: &str) -> Result<(), FabricError> {
            self.deleted.lock().unwrap().push(room.to_string());
            Ok(())
        }
        async fn create_dispatch(&self, room: &str, _agent_name: &str) -> Result<String, FabricError> {
            self.dispatches.lock().unwrap().push(room.to_string());
            Ok(format!("dispatch-{room}"))
        }
        fn generate_join_token(
            &self,
            _room: &str,
            _identity: &str,
            _display_name: &str,
            _ttl: Duration,
        ) -> Result<String, FabricError> {
            Ok("token".to_string())
        }
    }

    fn room(name: &str, participants: u32) -> RoomInfo {
        RoomInfo {
            name: name.to_string(),
            num_participants: participants,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn dispatches_to_unattended_room_with_humans() {
        let mut participants = HashMap::new();
        participants.insert(
            "room-1".to_string(),
            vec![ParticipantInfo {
                identity: "human-1".to_string(),
                joined_at: 0,
            }],
        );
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 1)],
            participants,
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        monitor.scan_once().await.unwrap();
        assert_eq!(fabric.dispatches.lock().unwrap().as_slice(), ["room-1"]);
    }

    #[tokio::test]
    async fn skips_rooms_with_no_humans() {
        let mut participants = HashMap::new();
        participants.insert(
            "room-1".to_string(),
            vec![ParticipantInfo {
                identity: "voxrelay-worker-1".to_string(),
                joined_at: 0,
            }],
        );
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 1)],
            participants,
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        monitor.scan_once().await.unwrap();
        assert!(fabric.dispatches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn respects_dispatch_cooldown() {
        let mut participants = HashMap::new();
        participants.insert(
            "room-1".to_string(),
            vec![ParticipantInfo {
                identity: "human-1".to_string(),
                joined_at: 0,
            }],
        );
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 1)],
            participants,
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        monitor.scan_once().await.unwrap();
        monitor.scan_once().await.unwrap();
        assert_eq!(fabric.dispatches.lock().unwrap().len(), 1, "second scan should be in cooldown");
    }

    #[tokio::test]
    async fn stale_cleanup_deletes_empty_unassigned_rooms_once_past_threshold() {
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 0), room("room-2", 2)],
            participants: HashMap::new(),
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
        .with_stale_room_threshold(Duration::from_millis(0));

        // First observation merely starts the clock; with a zero threshold
        // it is already stale, so the very next pass deletes it.
        monitor.stale_cleanup_once().await.unwrap();
        assert_eq!(fabric.deleted.lock().unwrap().as_slice(), ["room-1"]);
    }

    #[tokio::test]
    async fn stale_cleanup_does_not_delete_a_room_empty_for_less_than_the_threshold() {
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 0)],
            participants: HashMap::new(),
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
        .with_stale_room_threshold(Duration::from_secs(300));

        monitor.stale_cleanup_once().await.unwrap();
        monitor.stale_cleanup_once().await.unwrap();
        assert!(fabric.deleted.lock().unwrap().is_empty(), "room hasn't been empty long enough yet");
    }

    #[tokio::test]
    async fn stale_cleanup_removes_aged_agent_participant_from_human_free_room() {
        let mut participants = HashMap::new();
        participants.insert(
            "room-1".to_string(),
            vec![ParticipantInfo {
                identity: "voxrelay-worker-ghost".to_string(),
                joined_at: 0,
            }],
        );
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 1)],
            participants,
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
        .with_stale_agent_participant_threshold(Duration::from_millis(0));

        monitor.stale_cleanup_once().await.unwrap();
        assert_eq!(fabric.removed.lock().unwrap().as_slice(), ["voxrelay-worker-ghost"]);
        assert!(fabric.deleted.lock().unwrap().is_empty(), "the room itself is untouched, only the ghost participant");
    }

    #[tokio::test]
    async fn stale_cleanup_leaves_fresh_agent_participant_alone() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let mut participants = HashMap::new();
        participants.insert(
            "room-1".to_string(),
            vec![ParticipantInfo {
                identity: "voxrelay-worker-fresh".to_string(),
                joined_at: now,
            }],
        );
        let fabric = Arc::new(FakeFabric {
            rooms: vec![room("room-1", 1)],
            participants,
            dispatches: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
        });
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            fabric.clone(),
            registry,
            "voxrelay-worker",
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        monitor.stale_cleanup_once().await.unwrap();
        assert!(fabric.removed.lock().unwrap().is_empty(), "participant hasn't aged past the threshold yet");
    }
}

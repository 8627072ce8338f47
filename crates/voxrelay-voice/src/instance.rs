//! The per-agent instance: loaded memory, bounded message history, request
//! deduplication, background-task bookkeeping, and the circuit breaker
//! guarding the stateful agent service for this agent.
//!
//! One `AgentInstance` is shared (via `Arc`) across every room currently
//! assigned that agent; `voxrelay-worker::registry` owns the map from
//! agent id to instance.

use crate::error::VoiceError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;
use voxrelay_agentsvc::AgentServiceClient;
use voxrelay_reliability::{CircuitBreaker, CircuitBreakerConfig};
use voxrelay_types::{ChatMessage, RequestFingerprint};

/// Maximum number of turns kept in `message_history` before the oldest is
/// dropped.
const MAX_HISTORY_TURNS: usize = 20;
/// Capacity of the recent-responses dedup cache.
const RECENT_RESPONSE_CACHE_SIZE: usize = 64;

/// The outcome of checking a fingerprint against the dedup state.
#[derive(Debug, Clone)]
pub enum DedupOutcome {
    /// No prior or in-flight request for this fingerprint; proceed.
    Fresh,
    /// A request for this fingerprint is currently in flight; the caller
    /// should wait for it rather than issuing a duplicate call.
    InFlight,
    /// A response for this fingerprint was recently completed; reuse it.
    Cached(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    blocks: HashMap<String, String>,
    insertion_order: Vec<String>,
    persona: String,
    system_instructions: String,
}

/// A single agent's loaded memory, history, and reliability state.
pub struct AgentInstance {
    agent_id: String,
    memory: Mutex<MemoryState>,
    memory_loaded: AtomicBool,
    message_history: Mutex<VecDeque<ChatMessage>>,
    active_requests: Mutex<HashSet<RequestFingerprint>>,
    recent_responses: Mutex<lru::LruCache<RequestFingerprint, String>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    circuit_breaker: CircuitBreaker,
}

impl AgentInstance {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            memory: Mutex::new(MemoryState::default()),
            memory_loaded: AtomicBool::new(false),
            message_history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY_TURNS)),
            active_requests: Mutex::new(HashSet::new()),
            recent_responses: Mutex::new(lru::LruCache::new(
                NonZeroUsize::new(RECENT_RESPONSE_CACHE_SIZE).expect("nonzero cache size"),
            )),
            background_tasks: Mutex::new(Vec::new()),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn is_memory_loaded(&self) -> bool {
        self.memory_loaded.load(Ordering::Acquire)
    }

    /// Fetches persona/memory from the stateful agent service and caches it
    /// for the lifetime of this instance. Safe to call more than once (a
    /// later call replaces the cached memory); callers typically call this
    /// once per instance lifetime.
    pub async fn load_memory(&self, client: &AgentServiceClient) -> Result<(), VoiceError> {
        let record = client.get_agent(&self.agent_id).await?;
        let persona = record.select_persona();
        let map = record.memory_map();

        let mut order = Vec::new();
        for block in &record.memory.blocks {
            if !order.contains(&block.label) {
                order.push(block.label.clone());
            }
        }

        let base = format!("You are {}, a helpful voice assistant.", record.name);
        let mut system_instructions = if persona.is_empty() {
            base
        } else {
            persona.clone()
        };
        for label in &order {
            if voxrelay_types::MemoryLabel::PERSONA_PRECEDENCE.contains(&label.as_str()) {
                continue;
            }
            if let Some(value) = map.get(label) {
                system_instructions.push_str(&format!("\n\n### {label}\n{value}"));
            }
        }

        let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
        memory.blocks = map;
        memory.insertion_order = order;
        memory.persona = persona;
        memory.system_instructions = system_instructions;
        drop(memory);

        self.memory_loaded.store(true, Ordering::Release);
        tracing::info!(agent_id = %self.agent_id, "agent memory loaded");
        Ok(())
    }

    pub fn persona(&self) -> String {
        self.memory
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .persona
            .clone()
    }

    pub fn system_instructions(&self) -> String {
        self.memory
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .system_instructions
            .clone()
    }

    /// Appends a turn to the bounded message history, dropping the oldest
    /// turn once `MAX_HISTORY_TURNS` is exceeded.
    pub fn push_history(&self, message: ChatMessage) {
        let mut history = self.message_history.lock().unwrap_or_else(|p| p.into_inner());
        history.push_back(message);
        while history.len() > MAX_HISTORY_TURNS {
            history.pop_front();
        }
    }

    pub fn history_snapshot(&self) -> Vec<ChatMessage> {
        self.message_history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Checks `fingerprint` against the dedup state, marking it in-flight if
    /// fresh. Callers that receive `Fresh` must call `complete_request` when
    /// done, successful or not, to release the in-flight marker.
    pub fn begin_request(&self, fingerprint: &RequestFingerprint) -> DedupOutcome {
        if let Some(cached) = self
            .recent_responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(fingerprint)
        {
            return DedupOutcome::Cached(cached.clone());
        }

        let mut active = self.active_requests.lock().unwrap_or_else(|p| p.into_inner());
        if active.contains(fingerprint) {
            return DedupOutcome::InFlight;
        }
        active.insert(fingerprint.clone());
        DedupOutcome::Fresh
    }

    /// Releases the in-flight marker for `fingerprint` and, if `response` is
    /// `Some`, caches it for future duplicate requests.
    pub fn complete_request(&self, fingerprint: RequestFingerprint, response: Option<String>) {
        self.active_requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&fingerprint);
        if let Some(text) = response {
            self.recent_responses
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .put(fingerprint, text);
        }
    }

    /// Registers a spawned background task so it can be aborted on
    /// reconnect instead of leaking.
    pub fn track_background_task(&self, handle: JoinHandle<()>) {
        self.background_tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(handle);
    }

    /// Aborts and clears all tracked background tasks. Called when a room
    /// reconnects and any in-flight memory-mirror or streaming task for the
    /// old connection must not outlive it.
    pub fn abort_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().unwrap_or_else(|p| p.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Resets this instance for a fresh room binding: clears message
    /// history, forces memory to be reloaded on the next query, and cancels
    /// any background tasks left over from the previous connection (spec
    /// §4.3 `reset_for_reconnect`, §8 testable property).
    ///
    /// Does not touch `active_requests`/`recent_responses`: an in-flight
    /// request from the old connection should still resolve (its result is
    /// simply cached), and there is no harm in a stale hit in the recent-
    /// response cache surviving a reconnect.
    pub fn reset_for_reconnect(&self) {
        self.abort_background_tasks();
        self.message_history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        self.memory_loaded.store(false, Ordering::Release);
        let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
        *memory = MemoryState::default();
    }
}

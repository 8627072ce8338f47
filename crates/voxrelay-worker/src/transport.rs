//! Worker registration and job-dispatch transport.
//!
//! No public Rust crate currently implements the fabric's agent-worker
//! WebSocket protocol (job registration, availability signaling, WebRTC
//! session handoff) the way the official Go/Node/Python agent-worker SDKs
//! do — see `voxrelay_fabric::session` for the trait this gap sits behind.
//! `UnconfiguredTransport` makes that gap a loud startup failure rather than
//! an idle worker that silently never receives jobs; wiring a concrete
//! `WorkerTransport` against a live deployment is the one integration point
//! this crate leaves open.

use async_trait::async_trait;
use voxrelay_fabric::{FabricError, JobRequest, RoomSession, WorkerTransport};

pub struct UnconfiguredTransport;

#[async_trait]
impl WorkerTransport for UnconfiguredTransport {
    async fn register(&self, _agent_name: &str) -> Result<(), FabricError> {
        Err(FabricError::Config(
            "no WorkerTransport is wired to a live fabric deployment".to_string(),
        ))
    }

    async fn next_job_request(&self) -> Option<JobRequest> {
        None
    }

    async fn accept(&self, _job: &JobRequest) -> Result<Box<dyn RoomSession>, FabricError> {
        Err(FabricError::Config(
            "no WorkerTransport is wired to a live fabric deployment".to_string(),
        ))
    }

    async fn reject(&self, _job: &JobRequest) -> Result<(), FabricError> {
        Ok(())
    }
}

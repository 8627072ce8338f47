//! The voice worker process: registers with the media fabric, accepts room
//! jobs, and runs the room health monitor alongside them.

pub mod config;
pub mod health_monitor;
pub mod job_handler;
pub mod registry;
pub mod transport;

pub use config::{Config, ConfigError};
pub use health_monitor::HealthMonitor;
pub use job_handler::{JobHandler, JobHandlerConfig};
pub use registry::Registry;

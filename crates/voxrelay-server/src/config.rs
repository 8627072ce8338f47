//! HTTP control-plane configuration loading from file and environment
//! variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub livekit: LiveKitFileConfig,
    #[serde(default)]
    pub agent_service: AgentServiceConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
///
/// `host` defaults to `0.0.0.0`: the control plane must be reachable from
/// outside the process's own network namespace, so a loopback-only default
/// would be a correctness bug at the deployment level.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// LiveKit connection settings, used only to mint join tokens here (the
/// control plane does not call the room-service RPCs directly).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveKitFileConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

/// Connection settings for the stateful agent/memory service, proxied at
/// `GET /api/v1/*`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentServiceConfig {
    #[serde(default = "default_agent_service_base_url")]
    pub base_url: String,
}

/// The worker identity `POST /api/dispatch-agent` dispatches rooms to.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_name")]
    pub name: String,
}

/// CORS configuration. Empty `allowed_origins` means permissive (`Any`); a
/// non-empty list switches to an explicit allow-list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8080
}

fn default_agent_service_base_url() -> String {
    "http://localhost:8283".to_string()
}

fn default_worker_name() -> String {
    "voxrelay-worker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AgentServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_agent_service_base_url(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid environment variable {name}: {reason}")]
    InvalidEnvVar { name: &'static str, reason: String },

    #[error("required configuration value is missing: {field}")]
    ConfigMissing { field: &'static str },
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.livekit.url.trim().is_empty() {
        return Err(ConfigError::ConfigMissing { field: "livekit.url" });
    }
    if config.livekit.api_key.trim().is_empty() {
        return Err(ConfigError::ConfigMissing {
            field: "livekit.api_key",
        });
    }
    if config.livekit.api_secret.trim().is_empty() {
        return Err(ConfigError::ConfigMissing {
            field: "livekit.api_secret",
        });
    }
    Ok(())
}

fn parse_env_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => {
            let parsed = raw.parse::<T>().map_err(|err| ConfigError::InvalidEnvVar {
                name,
                reason: err.to_string(),
            })?;
            Ok(Some(parsed))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvVar {
            name,
            reason: "value is not valid unicode".to_string(),
        }),
    }
}

fn parse_env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            let parsed = match normalized.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
            .ok_or_else(|| ConfigError::InvalidEnvVar {
                name,
                reason: format!("expected one of [true,false,1,0,yes,no,on,off], got '{raw}'"),
            })?;
            Ok(Some(parsed))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvVar {
            name,
            reason: "value is not valid unicode".to_string(),
        }),
    }
}

fn parse_env_csv(name: &'static str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Loads configuration from an optional TOML file, overlaid with
/// environment variable overrides, then validates the result.
///
/// Environment overrides: `VOXRELAY_HOST`, `VOXRELAY_PORT`, `LIVEKIT_URL`,
/// `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET`, `AGENT_SERVICE_BASE_URL`,
/// `VOXRELAY_WORKER_NAME`, `VOXRELAY_CORS_ALLOWED_ORIGINS` (comma-separated),
/// `VOXRELAY_LOG_LEVEL`, `VOXRELAY_LOG_JSON`.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Some(host) = parse_env_var("VOXRELAY_HOST")? {
        config.server.host = host;
    }
    if let Some(port) = parse_env_var("VOXRELAY_PORT")? {
        config.server.port = port;
    }
    if let Some(url) = parse_env_var::<String>("LIVEKIT_URL")? {
        config.livekit.url = url;
    }
    if let Some(key) = parse_env_var::<String>("LIVEKIT_API_KEY")? {
        config.livekit.api_key = key;
    }
    if let Some(secret) = parse_env_var::<String>("LIVEKIT_API_SECRET")? {
        config.livekit.api_secret = secret;
    }
    if let Some(url) = parse_env_var::<String>("AGENT_SERVICE_BASE_URL")? {
        config.agent_service.base_url = url;
    }
    if let Some(name) = parse_env_var::<String>("VOXRELAY_WORKER_NAME")? {
        config.worker.name = name;
    }
    if let Some(origins) = parse_env_csv("VOXRELAY_CORS_ALLOWED_ORIGINS") {
        config.cors.allowed_origins = origins;
    }
    if let Some(level) = parse_env_var::<String>("VOXRELAY_LOG_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(json) = parse_env_bool("VOXRELAY_LOG_JSON")? {
        config.logging.json = json;
    }

    validate_config(&config)?;

    Ok(config)
}

//! Worker process configuration loading from file and environment variables.

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use voxrelay_fabric::livekit::LiveKitConfig as FabricLiveKitConfig;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub livekit: LiveKitFileConfig,
    #[serde(default)]
    pub agent_service: AgentServiceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub primary_agent: PrimaryAgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Worker runtime tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Name this process registers under with the fabric.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
    /// Interval between room-health-monitor scans, in seconds.
    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,
    /// Minimum time between repeat dispatches to the same empty room.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Seconds of room inactivity before a voice assistant session ends.
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
    /// Interval between stale-room cleanup sweeps, in seconds.
    #[serde(default = "default_stale_cleanup_interval_seconds")]
    pub stale_cleanup_interval_seconds: u64,
}

/// LiveKit connection settings as they appear in the worker's config file
/// (mirrors `voxrelay_fabric::livekit::LiveKitConfig`, which has no
/// `Deserialize` impl of its own since it is constructed programmatically
/// by every caller in the fabric crate's own tests).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveKitFileConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

impl From<LiveKitFileConfig> for FabricLiveKitConfig {
    fn from(cfg: LiveKitFileConfig) -> Self {
        FabricLiveKitConfig::new(cfg.url, cfg.api_key, cfg.api_secret)
    }
}

/// Connection settings for the stateful agent/memory service.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentServiceConfig {
    #[serde(default = "default_agent_service_base_url")]
    pub base_url: String,
}

/// LLM provider settings. `model` is mandatory: startup fails with
/// `ConfigError::ConfigMissing` if absent, rather than silently falling
/// back to some hardcoded model name that could drift from what the
/// deployment's provider actually serves.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub provider_base_url: Option<String>,
    /// Selects the hybrid fast path over the legacy all-stateful path
    /// (`HYBRID_STREAMING` env var). Defaults to `true`: hybrid is the
    /// recommended mode.
    #[serde(default = "default_hybrid_streaming")]
    pub hybrid_streaming: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            provider_base_url: None,
            hybrid_streaming: default_hybrid_streaming(),
        }
    }
}

fn default_hybrid_streaming() -> bool {
    true
}

/// Speech-to-text subprocess settings: no Rust STT binding crate covers
/// this, so a whisper.cpp-compatible binary is shelled out to via
/// `voxrelay_voice::providers::subprocess`. STT is disabled — `handle_audio`
/// becomes a no-op — unless both paths are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SttConfig {
    #[serde(default)]
    pub binary_path: Option<String>,
    /// Read from the `STT_API_KEY` env var; for the subprocess provider
    /// this is the path to the local model weights file rather than a
    /// bearer credential, since the wrapped binary takes no API key.
    #[serde(default)]
    pub model_path: Option<String>,
}

/// Text-to-speech subprocess settings (piper-compatible binary).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub binary_path: Option<String>,
    /// Read from the `TTS_API_KEY` env var; holds the voice/model file
    /// path for the subprocess provider. Overridden by `voice` when both
    /// are set, since `TTS_VOICE` is the more specific knob.
    #[serde(default)]
    pub model_path: Option<String>,
    /// Read from the `TTS_VOICE` env var; selects which voice model file
    /// piper loads.
    #[serde(default)]
    pub voice: Option<String>,
}

impl TtsConfig {
    pub fn resolved_model_path(&self) -> Option<&str> {
        self.voice.as_deref().or(self.model_path.as_deref())
    }
}

/// Identifies which agent this worker serves by default. Either `id` or
/// `name` must be set; `name` is resolved to an id via the agent service's
/// agent listing at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrimaryAgentConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_worker_name() -> String {
    "voxrelay-worker".to_string()
}

fn default_scan_interval_seconds() -> u64 {
    30
}

fn default_cooldown_seconds() -> u64 {
    60
}

fn default_idle_timeout_seconds() -> u64 {
    voxrelay_voice::DEFAULT_IDLE_TIMEOUT_SECONDS
}

fn default_stale_cleanup_interval_seconds() -> u64 {
    3600
}

fn default_agent_service_base_url() -> String {
    "http://localhost:8283".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            scan_interval_seconds: default_scan_interval_seconds(),
            cooldown_seconds: default_cooldown_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            stale_cleanup_interval_seconds: default_stale_cleanup_interval_seconds(),
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

    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("required configuration value is missing: {field}")]
    ConfigMissing { field: &'static str },
}

const MIN_SCAN_INTERVAL_SECONDS: u64 = 1;
const MIN_COOLDOWN_SECONDS: u64 = 1;
const MIN_IDLE_TIMEOUT_SECONDS: u64 = 10;
const MIN_STALE_CLEANUP_INTERVAL_SECONDS: u64 = 60;

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.worker.scan_interval_seconds < MIN_SCAN_INTERVAL_SECONDS {
        return Err(ConfigError::InvalidValue {
            field: "worker.scan_interval_seconds",
            reason: format!(
                "must be >= {MIN_SCAN_INTERVAL_SECONDS}, got {}",
                config.worker.scan_interval_seconds
            ),
        });
    }

    if config.worker.cooldown_seconds < MIN_COOLDOWN_SECONDS {
        return Err(ConfigError::InvalidValue {
            field: "worker.cooldown_seconds",
            reason: format!(
                "must be >= {MIN_COOLDOWN_SECONDS}, got {}",
                config.worker.cooldown_seconds
            ),
        });
    }

    if config.worker.idle_timeout_seconds < MIN_IDLE_TIMEOUT_SECONDS {
        return Err(ConfigError::InvalidValue {
            field: "worker.idle_timeout_seconds",
            reason: format!(
                "must be >= {MIN_IDLE_TIMEOUT_SECONDS}, got {}",
                config.worker.idle_timeout_seconds
            ),
        });
    }

    if config.worker.stale_cleanup_interval_seconds < MIN_STALE_CLEANUP_INTERVAL_SECONDS {
        return Err(ConfigError::InvalidValue {
            field: "worker.stale_cleanup_interval_seconds",
            reason: format!(
                "must be >= {MIN_STALE_CLEANUP_INTERVAL_SECONDS}, got {}",
                config.worker.stale_cleanup_interval_seconds
            ),
        });
    }

    if config.llm.model.trim().is_empty() {
        return Err(ConfigError::ConfigMissing { field: "llm.model" });
    }

    if config.livekit.url.trim().is_empty() {
        return Err(ConfigError::ConfigMissing {
            field: "livekit.url",
        });
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

    if config.primary_agent.id.is_none() && config.primary_agent.name.is_none() {
        return Err(ConfigError::ConfigMissing {
            field: "primary_agent.id or primary_agent.name",
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

/// Loads configuration from an optional TOML file, overlaid with
/// environment variable overrides, then validates the result.
///
/// Environment overrides: `VOXRELAY_WORKER_NAME`, `VOXRELAY_SCAN_INTERVAL_SECONDS`,
/// `VOXRELAY_COOLDOWN_SECONDS`, `IDLE_TIMEOUT_SECONDS`,
/// `VOXRELAY_STALE_CLEANUP_INTERVAL_SECONDS`, `LIVEKIT_URL`, `LIVEKIT_API_KEY`,
/// `LIVEKIT_API_SECRET`, `AGENT_SERVICE_BASE_URL`, `LLM_MODEL`,
/// `LLM_PROVIDER_BASE_URL`, `HYBRID_STREAMING`, `VOXRELAY_STT_BINARY_PATH`,
/// `STT_API_KEY`, `VOXRELAY_TTS_BINARY_PATH`, `TTS_API_KEY`, `TTS_VOICE`,
/// `PRIMARY_AGENT_ID`, `PRIMARY_AGENT_NAME`, `VOXRELAY_LOG_LEVEL`,
/// `VOXRELAY_LOG_JSON`.
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

    if let Some(name) = parse_env_var::<String>("VOXRELAY_WORKER_NAME")? {
        config.worker.worker_name = name;
    }
    if let Some(secs) = parse_env_var("VOXRELAY_SCAN_INTERVAL_SECONDS")? {
        config.worker.scan_interval_seconds = secs;
    }
    if let Some(secs) = parse_env_var("VOXRELAY_COOLDOWN_SECONDS")? {
        config.worker.cooldown_seconds = secs;
    }
    if let Some(secs) = parse_env_var("IDLE_TIMEOUT_SECONDS")? {
        config.worker.idle_timeout_seconds = secs;
    }
    if let Some(secs) = parse_env_var("VOXRELAY_STALE_CLEANUP_INTERVAL_SECONDS")? {
        config.worker.stale_cleanup_interval_seconds = secs;
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
    if let Some(model) = parse_env_var::<String>("LLM_MODEL")? {
        config.llm.model = model;
    }
    if let Some(url) = parse_env_var::<String>("LLM_PROVIDER_BASE_URL")? {
        config.llm.provider_base_url = Some(url);
    }
    if let Some(hybrid) = parse_env_bool("HYBRID_STREAMING")? {
        config.llm.hybrid_streaming = hybrid;
    }
    if let Some(path) = parse_env_var::<String>("VOXRELAY_STT_BINARY_PATH")? {
        config.stt.binary_path = Some(path);
    }
    if let Some(key) = parse_env_var::<String>("STT_API_KEY")? {
        config.stt.model_path = Some(key);
    }
    if let Some(path) = parse_env_var::<String>("VOXRELAY_TTS_BINARY_PATH")? {
        config.tts.binary_path = Some(path);
    }
    if let Some(key) = parse_env_var::<String>("TTS_API_KEY")? {
        config.tts.model_path = Some(key);
    }
    if let Some(voice) = parse_env_var::<String>("TTS_VOICE")? {
        config.tts.voice = Some(voice);
    }
    if let Some(id) = parse_env_var::<String>("PRIMARY_AGENT_ID")? {
        config.primary_agent.id = Some(id);
    }
    if let Some(name) = parse_env_var::<String>("PRIMARY_AGENT_NAME")? {
        config.primary_agent.name = Some(name);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Mutex, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    const ALL_VARS: &[&str] = &[
        "VOXRELAY_WORKER_NAME",
        "VOXRELAY_SCAN_INTERVAL_SECONDS",
        "VOXRELAY_COOLDOWN_SECONDS",
        "IDLE_TIMEOUT_SECONDS",
        "VOXRELAY_STALE_CLEANUP_INTERVAL_SECONDS",
        "LIVEKIT_URL",
        "LIVEKIT_API_KEY",
        "LIVEKIT_API_SECRET",
        "AGENT_SERVICE_BASE_URL",
        "LLM_MODEL",
        "LLM_PROVIDER_BASE_URL",
        "HYBRID_STREAMING",
        "VOXRELAY_STT_BINARY_PATH",
        "STT_API_KEY",
        "VOXRELAY_TTS_BINARY_PATH",
        "TTS_API_KEY",
        "TTS_VOICE",
        "PRIMARY_AGENT_ID",
        "PRIMARY_AGENT_NAME",
        "VOXRELAY_LOG_LEVEL",
        "VOXRELAY_LOG_JSON",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    fn set_minimal_valid_env() {
        std::env::set_var("LIVEKIT_URL", "http://localhost:7880");
        std::env::set_var("LIVEKIT_API_KEY", "devkey");
        std::env::set_var("LIVEKIT_API_SECRET", "secret");
        std::env::set_var("LLM_MODEL", "gpt-test");
        std::env::set_var("PRIMARY_AGENT_ID", "agent-1");
    }

    fn write_temp_config(contents: &str) -> String {
        let unique_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("voxrelay-worker-config-{unique_suffix}.toml"));
        fs::write(&path, contents).expect("failed to write temp config");
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn defaults_load_with_minimal_required_env() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();
        set_minimal_valid_env();

        let cfg = load_config(Some("this-file-does-not-exist.toml")).expect("load should succeed");
        assert_eq!(cfg.worker.worker_name, default_worker_name());
        assert_eq!(cfg.worker.idle_timeout_seconds, default_idle_timeout_seconds());
        assert_eq!(cfg.llm.model, "gpt-test");
        assert!(cfg.llm.hybrid_streaming, "hybrid mode is the recommended default");
        assert!(cfg.stt.binary_path.is_none());
        assert!(cfg.tts.resolved_model_path().is_none());

        clear_env();
    }

    #[test]
    fn hybrid_streaming_and_tts_voice_are_overridable_via_env() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();
        set_minimal_valid_env();
        std::env::set_var("HYBRID_STREAMING", "false");
        std::env::set_var("TTS_VOICE", "en_US-amy-medium");

        let cfg = load_config(None).expect("load should succeed");
        assert!(!cfg.llm.hybrid_streaming);
        assert_eq!(cfg.tts.resolved_model_path(), Some("en_US-amy-medium"));

        clear_env();
    }

    #[test]
    fn missing_llm_model_is_config_missing() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();
        set_minimal_valid_env();
        std::env::remove_var("LLM_MODEL");

        let err = load_config(None).expect_err("load should fail without llm.model");
        match err {
            ConfigError::ConfigMissing { field } => assert_eq!(field, "llm.model"),
            other => panic!("unexpected error: {other}"),
        }

        clear_env();
    }

    #[test]
    fn missing_primary_agent_is_config_missing() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();
        set_minimal_valid_env();
        std::env::remove_var("PRIMARY_AGENT_ID");

        let err = load_config(None).expect_err("load should fail without a primary agent");
        match err {
            ConfigError::ConfigMissing { field } => {
                assert_eq!(field, "primary_agent.id or primary_agent.name")
            }
            other => panic!("unexpected error: {other}"),
        }

        clear_env();
    }

    #[test]
    fn primary_agent_name_satisfies_requirement() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();
        set_minimal_valid_env();
        std::env::remove_var("PRIMARY_AGENT_ID");
        std::env::set_var("PRIMARY_AGENT_NAME", "Ava");

        let cfg = load_config(None).expect("load should succeed with primary_agent.name set");
        assert_eq!(cfg.primary_agent.name.as_deref(), Some("Ava"));

        clear_env();
    }

    #[test]
    fn out_of_range_idle_timeout_returns_error() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();
        set_minimal_valid_env();
        std::env::set_var("IDLE_TIMEOUT_SECONDS", "1");

        let err = load_config(None).expect_err("load should fail for too-low idle timeout");
        match err {
            ConfigError::InvalidValue { field, .. } => {
                assert_eq!(field, "worker.idle_timeout_seconds")
            }
            other => panic!("unexpected error: {other}"),
        }

        clear_env();
    }

    #[test]
    fn config_file_values_are_overridden_by_env() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_env();

        let path = write_temp_config(
            r#"
[worker]
worker_name = "from-file"

[llm]
model = "from-file-model"

[primary_agent]
id = "from-file-agent"

[livekit]
url = "http://file:7880"
api_key = "file-key"
api_secret = "file-secret"
"#,
        );

        std::env::set_var("LLM_MODEL", "from-env-model");

        let cfg = load_config(Some(path.as_str())).expect("load should succeed");
        assert_eq!(cfg.worker.worker_name, "from-file");
        assert_eq!(cfg.llm.model, "from-env-model");

        fs::remove_file(path).expect("failed to remove temp config");
        clear_env();
    }
}

//! Voice worker binary — registers with the media fabric, accepts room
//! jobs, and runs the room health monitor alongside them.
//!
//! Exit codes: `0` clean shutdown, `1` configuration error, `2` fabric
//! registration/transport failure.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxrelay_agentsvc::AgentServiceClient;
use voxrelay_fabric::livekit::{LiveKitConfig, LiveKitFabric};
use voxrelay_fabric::{Fabric, WorkerTransport};
use voxrelay_voice::providers::{SttProvider, SubprocessSttProvider, SubprocessTtsProvider, TtsProvider};
use voxrelay_voice::{HttpLlmProvider, LlmMode, LlmNode, PrimaryAgent};
use voxrelay_worker::config::{self, Config};
use voxrelay_worker::health_monitor::HealthMonitor;
use voxrelay_worker::job_handler::{JobHandler, JobHandlerConfig};
use voxrelay_worker::registry::Registry;
use voxrelay_worker::transport::UnconfiguredTransport;

const CONFIG_ERROR_EXIT: i32 = 1;
const TRANSPORT_ERROR_EXIT: i32 = 2;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("VOXRELAY_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(CONFIG_ERROR_EXIT);
        }
    };

    init_tracing(&config);

    let agent_client = Arc::new(AgentServiceClient::new(config.agent_service.base_url.clone()));

    let primary_agent = match resolve_primary_agent(&agent_client, &config).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve primary agent");
            std::process::exit(CONFIG_ERROR_EXIT);
        }
    };
    tracing::info!(agent_id = %primary_agent.id, agent_name = %primary_agent.name, "resolved primary agent");

    let fabric: Arc<dyn Fabric> = Arc::new(LiveKitFabric::new(LiveKitConfig::new(
        config.livekit.url.clone(),
        config.livekit.api_key.clone(),
        config.livekit.api_secret.clone(),
    )));

    let llm_provider = Arc::new(HttpLlmProvider::new(
        config
            .llm
            .provider_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        std::env::var("LLM_API_KEY").unwrap_or_default(),
    ));
    let llm_node = Arc::new(LlmNode::new(llm_provider, agent_client.clone(), config.llm.model.clone()));

    let registry = Arc::new(Registry::new());
    let transport: Arc<dyn WorkerTransport> = Arc::new(UnconfiguredTransport);

    if let Err(e) = transport.register(&config.worker.worker_name).await {
        tracing::error!(error = %e, "failed to register worker with the fabric");
        std::process::exit(TRANSPORT_ERROR_EXIT);
    }

    let llm_mode = if config.llm.hybrid_streaming {
        LlmMode::Fast
    } else {
        LlmMode::Stateful
    };

    let mut job_handler_builder = JobHandler::new(
        registry.clone(),
        fabric.clone(),
        transport.clone(),
        agent_client.clone(),
        llm_node,
        JobHandlerConfig {
            primary_agent_id: primary_agent.id.clone(),
            primary_agent_name: primary_agent.name.clone(),
            llm_mode,
            idle_timeout: Duration::from_secs(config.worker.idle_timeout_seconds),
            debug_transcripts: std::env::var("VOXRELAY_DEBUG_TRANSCRIPTS").is_ok(),
        },
    );
    if let (Some(binary), Some(model)) = (&config.stt.binary_path, &config.stt.model_path) {
        let stt: Arc<dyn SttProvider> = Arc::new(SubprocessSttProvider::new(binary, model));
        job_handler_builder = job_handler_builder.with_stt(stt);
    }
    if let (Some(binary), Some(voice)) = (&config.tts.binary_path, config.tts.resolved_model_path()) {
        let tts: Arc<dyn TtsProvider> = Arc::new(SubprocessTtsProvider::new(binary, voice));
        job_handler_builder = job_handler_builder.with_tts(tts);
    }
    let job_handler = Arc::new(job_handler_builder);

    let health_monitor = Arc::new(HealthMonitor::new(
        fabric,
        registry,
        config.worker.worker_name.clone(),
        Duration::from_secs(config.worker.scan_interval_seconds),
        Duration::from_secs(config.worker.cooldown_seconds),
    ));

    let mut background_tasks = Vec::new();

    background_tasks.push(tokio::spawn({
        let monitor = health_monitor.clone();
        async move { monitor.run_scan_loop().await }
    }));
    background_tasks.push(tokio::spawn({
        let monitor = health_monitor.clone();
        let interval = Duration::from_secs(config.worker.stale_cleanup_interval_seconds);
        async move { monitor.run_stale_cleanup_loop(interval).await }
    }));
    background_tasks.push(tokio::spawn({
        let transport = transport.clone();
        let job_handler = job_handler.clone();
        async move {
            loop {
                match transport.next_job_request().await {
                    Some(job) => {
                        let job_handler = job_handler.clone();
                        tokio::spawn(async move { job_handler.handle(job).await });
                    }
                    None => {
                        tracing::warn!("job request transport closed");
                        break;
                    }
                }
            }
        }
    }));

    tracing::info!(worker_name = %config.worker.worker_name, "voxrelay-worker started");

    shutdown_signal().await;
    tracing::info!("shutting down voxrelay-worker");
    for task in background_tasks {
        task.abort();
    }
    std::process::exit(0);
}

/// Resolves the process's primary-agent lock target. If `primary_agent.id`
/// is configured, that id wins and its display name is fetched for the
/// lock's name check. Otherwise the configured `primary_agent.name` is
/// matched against `GET /v1/agents`; the first match wins, and a
/// second match is logged as a warning rather than failing the whole
/// process.
async fn resolve_primary_agent(client: &AgentServiceClient, config: &Config) -> Result<PrimaryAgent, String> {
    if let Some(id) = &config.primary_agent.id {
        let name = match client.get_agent(id).await {
            Ok(record) => record.name,
            Err(e) => {
                tracing::warn!(agent_id = %id, error = %e, "could not fetch primary agent record, falling back to configured name");
                config
                    .primary_agent
                    .name
                    .clone()
                    .ok_or_else(|| format!("primary_agent.id '{id}' could not be resolved and no primary_agent.name fallback was set: {e}"))?
            }
        };
        return Ok(PrimaryAgent { id: id.clone(), name });
    }

    let name = config
        .primary_agent
        .name
        .clone()
        .ok_or_else(|| "neither primary_agent.id nor primary_agent.name is set".to_string())?;

    let agents = client
        .list_agents()
        .await
        .map_err(|e| format!("failed to list agents to resolve primary_agent.name '{name}': {e}"))?;
    let mut matches = agents.into_iter().filter(|a| a.name == name);
    let first = matches
        .next()
        .ok_or_else(|| format!("no agent named '{name}' was found"))?;
    if matches.next().is_some() {
        tracing::warn!(name = %name, "multiple agents share primary_agent.name; using the first match");
    }

    Ok(PrimaryAgent {
        id: first.id,
        name: first.name,
    })
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

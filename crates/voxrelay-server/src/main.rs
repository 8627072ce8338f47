//! HTTP control-plane binary — the browser's sole entry point.
//!
//! Exit codes: `0` clean shutdown, `1` configuration error, `2` port bind
//! failure.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxrelay_fabric::livekit::{LiveKitConfig, LiveKitFabric};
use voxrelay_fabric::Fabric;
use voxrelay_server::config::{self, Config};
use voxrelay_server::{app, AppState};

const CONFIG_ERROR_EXIT: i32 = 1;
const BIND_ERROR_EXIT: i32 = 2;

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

    let fabric: Arc<dyn Fabric> = Arc::new(LiveKitFabric::new(LiveKitConfig::new(
        config.livekit.url.clone(),
        config.livekit.api_key.clone(),
        config.livekit.api_secret.clone(),
    )));

    let state = Arc::new(AppState::new(
        fabric,
        config.agent_service.base_url.clone(),
        config.worker.name.clone(),
    ));

    let router = app(state, &config.cors);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind HTTP listener");
            std::process::exit(BIND_ERROR_EXIT);
        }
    };

    tracing::info!(addr = %addr, "voxrelay-server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| tracing::error!(error = %e, "server exited with error"));

    tracing::info!("voxrelay-server shut down");
    std::process::exit(0);
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

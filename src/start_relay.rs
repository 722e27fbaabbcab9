//! Startup helpers for the relay server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::backend::OllamaBackend;
use crate::chat::error::ChatResult;
use crate::config::RelayConfig;
use crate::server::{self, AppState};

/// Install the global `tracing` subscriber (`RUST_LOG` aware, INFO by default).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Run the server (used by the `ollama-chat-relay` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting ollama-chat-relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    let state = match initialize(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        probe_ollama(&config).await;
        server::run_server_with_shutdown(state, config.port, shutdown_signal()).await
    });
    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Server stopped");
    ExitCode::SUCCESS
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if the configuration is invalid.
pub fn initialize(config: &RelayConfig) -> ChatResult<Arc<AppState>> {
    tracing::info!("Ollama endpoint: {}", config.ollama.base_url);
    AppState::new(config)
}

async fn probe_ollama(config: &RelayConfig) {
    let Ok(backend) = OllamaBackend::new(&config.ollama) else {
        return;
    };
    match backend.is_ready().await {
        Ok(true) => tracing::info!("Ollama is reachable"),
        _ => tracing::warn!(
            "Ollama is not reachable at {}, requests will fail until it is up",
            config.ollama.base_url
        ),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

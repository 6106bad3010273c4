use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod tts;

use api::routes::{create_router, AppState};
use config::ServerConfig;
use tts::{EngineHandle, HiggsEngine, TtsService};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let addr = config.bind_addr();

    tracing::info!("Higgs Audio Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Initializing Higgs Audio engine...");
    tracing::info!("  Model: {}", config.engine.model_path);
    tracing::info!("  Tokenizer: {}", config.engine.tokenizer_path);
    tracing::info!("  Device: {}", config.engine.device);
    tracing::info!("  Port: {}", config.port);

    // Create the engine before any port is opened
    let engine_config = config.engine.clone();
    let spawned = tokio::task::spawn_blocking(move || HiggsEngine::spawn(&engine_config)).await;
    let engine = match spawned {
        Ok(Ok(engine)) => EngineHandle::new(engine),
        Ok(Err(e)) => {
            tracing::error!("Failed to initialize engine: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Engine initialization task failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Engine initialized successfully");

    // Create app state
    let state = Arc::new(AppState {
        tts: TtsService::new(engine),
    });

    // Create router
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("  Health check: http://localhost:{}/health", config.port);
    tracing::info!(
        "  Generate endpoint: http://localhost:{}/v1/audio/generate",
        config.port
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

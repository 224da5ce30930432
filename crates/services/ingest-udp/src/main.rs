//! UDP Ingest Gateway Binary
//!
//! Entry point for the UDP ingest gateway service.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsgate_core::passthrough::PassthroughEngineFactory;
use tsgate_core::sink::NullSinkFactory;

use tsgate_ingest_udp::{
    api::{build_router, AppState},
    config::Config,
    session::SessionManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting UDP Ingest Gateway...");

    // Load configuration (optional TOML path as first argument)
    let config = Arc::new(Config::load(std::env::args().nth(1))?);

    tracing::info!(
        "Configuration: HTTP port={}, idle_timeout_ms={}, max_sessions={}",
        config.server.http_port,
        config.ingest.idle_timeout_ms,
        config.ingest.max_sessions
    );

    // Engine and sink factories are injected here, once, at startup.
    // A native transport-stream demuxer plugs in by providing its own
    // EngineFactory; the passthrough engine handles pre-segmented
    // elementary ingest. Likewise a broadcast pipeline provides a
    // StreamSinkFactory in place of the null sink.
    let engine_factory = Arc::new(PassthroughEngineFactory);
    let sink_factory = Arc::new(NullSinkFactory);

    // Initialize session manager
    let session_manager = Arc::new(SessionManager::new(
        config.clone(),
        engine_factory,
        sink_factory,
    ));

    // Create shutdown signal channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Spawn the idle reaper; periodic health checks double as teardown
    let reaper_handle = {
        let session_manager = session_manager.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let interval = Duration::from_secs(config.ingest.reap_interval_secs);
        tokio::spawn(async move {
            session_manager.run_reaper_loop(interval, shutdown_rx).await;
        })
    };

    // Create app state and build HTTP router
    let state = AppState::new(session_manager.clone(), config.clone());
    let router = build_router(state);

    // Start HTTP server
    let bind_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);

    // Run the HTTP server with graceful shutdown on SIGTERM/SIGINT
    let shutdown_tx_clone = shutdown_tx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
            let _ = shutdown_tx_clone.send(());
        })
        .await?;

    // Signal shutdown to background tasks and drain active sessions
    let _ = shutdown_tx.send(());
    session_manager.close_all().await;
    let _ = reaper_handle.await;

    tracing::info!("UDP Ingest Gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

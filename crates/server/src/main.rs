//! Voice agent orchestrator entry point: loads settings, wires the
//! admission HTTP router, and serves it with graceful shutdown.

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_agent_config::{load_settings, Settings};
use voice_agent_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        max_sessions = settings.server.max_sessions,
        "starting voice agent orchestrator"
    );
    tracing::info!(
        signaling = %settings.endpoints.signaling_url,
        token_stream = %settings.endpoints.token_stream_url,
        transcription = %settings.endpoints.transcription_url,
        "upstream endpoints configured"
    );

    let bind_addr: SocketAddr = settings
        .server
        .bind_addr
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

    let app = create_router(AppState::new(settings));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM (spec.md §5: session close cancels every
/// outstanding background task cooperatively; this is the process-level
/// equivalent for the admission server itself).
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
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_agent={},tower_http=info", settings.log_level).into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

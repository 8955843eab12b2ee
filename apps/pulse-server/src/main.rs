//! Pulse Server Binary
//!
//! Starts the dashboard broadcast channel.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin pulse-server
//! ```
//!
//! # Environment Variables
//!
//! - `PULSE_ENV`: development | production (default: development)
//! - `PULSE_SERVER_PORT`: HTTP + WebSocket port (default: 8090)
//! - `PULSE_SESSION_QUEUE_CAPACITY`: Frames buffered per session (default: 256)
//! - `PULSE_SNAPSHOT_ON_SUBSCRIBE`: Send the latest topic value on subscribe (default: true)
//! - `PULSE_WELCOME_MESSAGE`: Message carried by the welcome envelope
//! - `OTEL_ENABLED`: Enable OpenTelemetry span export (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: pulse-server)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use pulse_server::infrastructure::telemetry;
use pulse_server::{AppState, BroadcastChannel, ChannelConfig, HttpServer, ServerConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Grace period for session writers to flush their close frames.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Pulse server");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus metrics unavailable");
    }

    let config = ServerConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let channel = Arc::new(BroadcastChannel::new(ChannelConfig::from(&config.channel)));
    let state = Arc::new(AppState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&channel),
        config.channel.session_queue_capacity,
        shutdown_token.clone(),
    ));

    let server = HttpServer::new(config.server.port, state);
    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_task => {
            shutdown_token.cancel();
            result??;
            return Ok(());
        }
        () = await_shutdown(shutdown_token.clone()) => {}
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await {
        Ok(result) => result??,
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            sessions = channel.session_count(),
            "Shutdown timed out with sessions still open"
        ),
    }

    tracing::info!("Pulse server stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ServerConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        port = config.server.port,
        session_queue_capacity = config.channel.session_queue_capacity,
        snapshot_on_subscribe = config.channel.snapshot_on_subscribe,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}

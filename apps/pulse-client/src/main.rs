//! Pulse Client Binary
//!
//! Connects to the broadcast server, logs envelopes for the configured
//! topics, and drains the offline action queue whenever the connection opens.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin pulse-client
//! ```
//!
//! # Environment Variables
//!
//! - `PULSE_ENV`: development | production (default: development)
//! - `PULSE_WS_URL`: Broadcast endpoint (default: <ws://localhost:8090/ws>, required in production)
//! - `PULSE_RECONNECT_BASE_DELAY_MS`: First reconnect delay (default: 1000)
//! - `PULSE_RECONNECT_MAX_ATTEMPTS`: Reconnect attempts before giving up (default: 5)
//! - `PULSE_API_BASE_URL`: Dashboard API (default: <http://localhost:3000>, required in production)
//! - `PULSE_API_TIMEOUT_SECS`: Per-request timeout (default: 10)
//! - `PULSE_STORE_PATH`: Offline queue file (default: .pulse/client-store.json)
//! - `PULSE_SYNC_RETRY_CAP`: Failed deliveries before an action is failed (default: 3)
//! - `PULSE_SYNC_CLASSIFY_CLIENT_ERRORS`: Fail 4xx rejections immediately (default: true)
//! - `PULSE_TOPICS`: Comma-separated topics (default: price,trade)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use pulse_client::infrastructure::telemetry;
use pulse_client::{
    ClientConfig, ConnectionManager, Envelope, HttpDashboardApi, OfflineQueueSync,
    PersistentStore, TungsteniteTransport,
};
use tokio::signal;

/// How long to wait for the sync loop after shutdown is requested.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_crypto_provider();
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting Pulse client");

    let config = ClientConfig::from_env()?;
    log_config(&config);

    let store = Arc::new(PersistentStore::open(config.store.path.clone()));
    if !store.is_available().await {
        tracing::warn!(
            path = %config.store.path.display(),
            "Store unavailable, offline actions will not be persisted"
        );
    }

    let api = Arc::new(HttpDashboardApi::new(
        config.api.base_url.clone(),
        config.api.timeout,
    )?);
    let manager = ConnectionManager::new(
        config.connection_config(),
        Arc::new(TungsteniteTransport::new()),
    );

    for topic in &config.topics {
        manager.subscribe(*topic, |envelope: &Envelope| -> anyhow::Result<()> {
            tracing::info!(
                topic = %envelope.kind,
                timestamp = %envelope.timestamp,
                data = %envelope.data,
                "Envelope received"
            );
            Ok(())
        });

        let cache = Arc::clone(&store);
        manager.subscribe(*topic, move |envelope: &Envelope| -> anyhow::Result<()> {
            cache.set_cached(&format!("snapshot:{}", envelope.kind), envelope.data.clone());
            Ok(())
        });
    }

    let sync = OfflineQueueSync::new(Arc::clone(&store), api, config.sync_config());
    let sync_task = tokio::spawn({
        let sync = sync.clone();
        let state_rx = manager.watch_state();
        async move { sync.run(state_rx).await }
    });

    let status_task = tokio::spawn({
        let mut status_rx = sync.watch_status();
        async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                tracing::info!(%status, "Dashboard status");
            }
        }
    });

    manager.connect();

    await_shutdown().await;

    sync.shutdown();
    manager.disconnect();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, sync_task).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Sync loop did not stop in time"
        );
    }
    status_task.abort();

    tracing::info!("Pulse client stopped");
    Ok(())
}

/// Install the rustls crypto provider before any TLS connection is made.
#[allow(clippy::expect_used)]
fn install_crypto_provider() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    let topics: Vec<&str> = config.topics.iter().map(|t| t.as_str()).collect();
    tracing::info!(
        environment = config.environment.as_str(),
        ws_url = %config.connection.ws_url,
        api_base_url = %config.api.base_url,
        reconnect_base_delay_ms = config.connection.reconnect_base_delay.as_millis(),
        reconnect_max_attempts = config.connection.reconnect_max_attempts,
        retry_cap = config.sync.retry_cap,
        topics = ?topics,
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

/// Wait for Ctrl+C or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_shutdown() {
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
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

//! HTTP Server
//!
//! One listener for the dashboard channel and its operational endpoints.
//!
//! # Endpoints
//!
//! - `GET /ws` - WebSocket upgrade into a broadcast session
//! - `POST /publish/{topic}` - Broadcast a JSON payload (used by event generators)
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (fails while draining)
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pulse_protocol::Topic;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{BroadcastChannel, BroadcastReport, ChannelError};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::websocket::ws_handler;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Server version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Open sessions.
    pub sessions: usize,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting sessions.
    Healthy,
    /// Shutdown requested; sessions are being closed.
    Draining,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Total (session, topic) pairs.
    pub total: usize,
    /// Subscribers per topic.
    pub per_topic: BTreeMap<String, usize>,
}

/// `POST /publish/{topic}` response.
#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    /// Topic broadcast on.
    pub topic: Topic,
    /// Fan-out outcome.
    #[serde(flatten)]
    pub report: BroadcastReport,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// Application State
// =============================================================================

/// Shared state for HTTP and WebSocket handlers.
pub struct AppState {
    version: String,
    started_at: Instant,
    channel: Arc<BroadcastChannel>,
    session_queue_capacity: usize,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        version: String,
        channel: Arc<BroadcastChannel>,
        session_queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            channel,
            session_queue_capacity,
            shutdown,
        }
    }

    /// The broadcast channel.
    #[must_use]
    pub const fn channel(&self) -> &Arc<BroadcastChannel> {
        &self.channel
    }

    /// Per-session outbound queue capacity.
    #[must_use]
    pub const fn session_queue_capacity(&self) -> usize {
        self.session_queue_capacity
    }

    /// Server-wide shutdown token.
    #[must_use]
    pub const fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Build the router with every route.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/publish/{topic}", post(publish_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the broadcast channel.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>) -> Self {
        Self { port, state }
    }

    /// Bind the configured port and serve until the shutdown token fires.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server fails while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;
        Self::serve(listener, self.state).await
    }

    /// Serve on an already-bound listener until the shutdown token fires.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` on a fatal server error.
    pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), HttpServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;
        tracing::info!(addr = %local_addr, "Pulse server listening");

        let shutdown = state.shutdown().clone();
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Pulse server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn publish_handler(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let topic: Topic = match topic.parse() {
        Ok(topic) => topic,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    };

    match state.channel.broadcast(topic, payload) {
        Ok(report) => {
            tracing::debug!(%topic, recipients = report.recipients, "Published envelope");
            (StatusCode::OK, Json(PublishResponse { topic, report })).into_response()
        }
        Err(e @ ChannelError::NotRoutable(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(e @ ChannelError::Codec(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Draining => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let stats = state.channel.stats();
    let status = if state.shutdown.is_cancelled() {
        HealthStatus::Draining
    } else {
        HealthStatus::Healthy
    };

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        sessions: stats.sessions,
        subscriptions: SubscriptionStatus {
            total: stats.subscriptions,
            per_topic: stats
                .per_topic
                .into_iter()
                .map(|(topic, count)| (topic.as_str().to_string(), count))
                .collect(),
        },
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

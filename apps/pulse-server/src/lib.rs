#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Pulse Server - Real-time Dashboard Broadcast Channel
//!
//! Accepts dashboard WebSocket sessions, applies their topic subscriptions,
//! and fans out typed market events pushed by upstream generators.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Session registry and per-topic subscription counts
//!   - `session`: Session identifiers, subscriptions, registry statistics
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `SessionSink` delivery interface
//!   - `services`: `BroadcastChannel` (connect, commands, fan-out, snapshots)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: axum WebSocket sessions with bounded outbound queues
//!   - `http`: Router, publish endpoint, health and metrics endpoints
//!   - `config`: Environment-driven configuration
//!   - `metrics`: Prometheus recorders
//!   - `telemetry`: tracing + OpenTelemetry setup
//!
//! # Data Flow
//!
//! ```text
//!                          ┌──────────────────┐   QueueSink   ┌──────────┐
//! POST /publish/{topic} ──►│                  │──────────────►│ session 1│
//!                          │ BroadcastChannel │──────────────►│ session 2│
//! /ws subscribe frames ───►│                  │──────────────►│ session N│
//!                          └──────────────────┘               └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session state with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::session::{RegistryStats, SessionId, SessionRegistry, SubscribeOutcome};

// Application services
pub use application::ports::{DeliveryError, Frame, SessionSink, SharedSink};
pub use application::services::{BroadcastChannel, BroadcastReport, ChannelConfig, ChannelError};

// Infrastructure config
pub use infrastructure::config::{
    ChannelSettings, ConfigError, Environment, ServerConfig, ServerSettings,
};

// HTTP server (for integration tests)
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};
pub use infrastructure::websocket::QueueSink;

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

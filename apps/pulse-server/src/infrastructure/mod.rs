//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete adapters around the broadcast channel:
//! the WebSocket endpoint, the HTTP surface, configuration, and observability.

/// Configuration loaded from the environment.
pub mod config;

/// HTTP server: WebSocket upgrade, publish, health, and metrics routes.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket session adapter.
pub mod websocket;

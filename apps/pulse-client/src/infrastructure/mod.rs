//! Infrastructure Layer
//!
//! Adapters for the application ports and process setup.
//!
//! - `websocket`: `Transport` over `tokio-tungstenite`
//! - `memory`: `Transport` over in-process channels
//! - `http`: `DashboardApi` over `reqwest`
//! - `store`: Durable offline queue and snapshot cache
//! - `config`: Environment-driven configuration
//! - `telemetry`: Logging setup

pub mod config;
pub mod http;
pub mod memory;
pub mod store;
pub mod telemetry;
pub mod websocket;

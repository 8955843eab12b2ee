//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the broadcast channel service and the port it uses
//! to hand frames to connected sessions.

/// Port interfaces for session delivery.
pub mod ports;

/// Broadcast channel service.
pub mod services;

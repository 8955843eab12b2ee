//! Domain Layer - Connection, subscription, and offline action types.
//!
//! Pure state and policy. Nothing here performs I/O.

/// Connection state, lifecycle events, and reconnect backoff.
pub mod connection;

/// Offline actions and the dashboard status line.
pub mod offline;

/// Local subscriptions with per-topic reference counts.
pub mod subscription;

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

//! Pulse Client - Dashboard Connection Manager and Offline Queue
//!
//! Keeps one multiplexed connection to the broadcast server for every
//! widget in the process, and delivers user actions queued while offline
//! once the connection comes back.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Plain state with no I/O
//!   - `subscription`: Local subscriptions with per-topic reference counts
//!   - `connection`: Connection states, lifecycle events, reconnect backoff
//!   - `offline`: Queued actions, their status, and the dashboard status line
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `Transport`, `Subscriber`, `DashboardApi`
//!   - `services`: `ConnectionManager`, `OfflineQueueSync`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: `tokio-tungstenite` transport
//!   - `memory`: In-process transport
//!   - `http`: `reqwest` dashboard API client
//!   - `store`: Durable JSON-backed queue and snapshot cache
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//!                ┌───────────────────┐  notify   ┌──────────┐
//! Transport ────►│ ConnectionManager │──────────►│ widget 1 │
//!   (1 link)  ◄──│  topic refcounts  │──────────►│ widget N │
//!                └─────────┬─────────┘           └──────────┘
//!                          │ watch_state()
//!                          ▼
//!                ┌───────────────────┐  deliver  ┌──────────────┐
//! PersistentStore│  OfflineQueueSync │──────────►│ DashboardApi │
//!   (FIFO)  ────►│  one pass at once │           └──────────────┘
//!                └───────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Subscription, connection, and offline action state.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Wire types
pub use pulse_protocol::{Envelope, Topic};

// Domain types
pub use domain::connection::{ConnectionEvent, ConnectionState, ReconnectConfig, ReconnectPolicy};
pub use domain::offline::{
    ActionId, ActionRequest, ActionStatus, DashboardStatus, HttpMethod, OfflineAction,
    QueuedAction,
};
pub use domain::subscription::SubscriptionId;

// Ports
pub use application::ports::{
    ApiError, DashboardApi, Frame, Preferences, SharedSubscriber, Subscriber, Transport,
    TransportError, TransportLink,
};

// Application services
pub use application::services::{
    ConnectionConfig, ConnectionManager, OfflineQueueSync, SyncConfig, SyncOutcome, SyncReport,
};

// Infrastructure adapters
pub use infrastructure::config::{ClientConfig, ConfigError};
pub use infrastructure::http::HttpDashboardApi;
pub use infrastructure::memory::{MemoryConnection, MemoryTransport};
pub use infrastructure::store::{PersistentStore, StoreError};
pub use infrastructure::websocket::TungsteniteTransport;

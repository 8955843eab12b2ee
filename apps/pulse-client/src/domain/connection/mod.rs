//! Connection State
//!
//! The client's view of its single logical connection to the broadcast
//! server, and the lifecycle events the connection manager publishes.
//!
//! ```text
//! disconnected ──► connecting ──► connected ──► closing ──► disconnected
//!       ▲               │              │
//!       └───────────────┴──────────────┘  (failure: schedule reconnect)
//! ```

use std::fmt;
use std::time::Duration;

mod reconnect;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};

/// State of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Disconnected,
    /// Opening the connection.
    Connecting,
    /// Open and replaying or carrying subscriptions.
    Connected,
    /// Deliberately closing after `disconnect()`.
    Closing,
}

impl ConnectionState {
    /// Whether the connection is open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Lowercase name for logs and status displays.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events published by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection opened and subscriptions replayed.
    Connected {
        /// Distinct topics re-subscribed on open.
        replayed: usize,
    },
    /// Connection closed or failed to open.
    Disconnected,
    /// A reconnect attempt has been scheduled.
    ReconnectScheduled {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Automatic reconnection stopped after the attempt cap.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

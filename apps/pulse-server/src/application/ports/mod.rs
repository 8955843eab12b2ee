//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `SessionSink`: Hands an encoded frame to one connected session
//!
//! ## Driver Ports (Inbound)
//!
//! The WebSocket adapter drives `BroadcastChannel` directly through
//! `on_connect`, `on_message`, and `on_disconnect`.

use std::sync::Arc;

/// An encoded JSON text frame, shared across every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Reason a frame could not be handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The session's outbound queue is full (slow consumer).
    #[error("session outbound queue is full")]
    QueueFull,
    /// The session's connection is closing or closed.
    #[error("session is closed")]
    Closed,
}

impl DeliveryError {
    /// Metric label for this failure.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

/// Outbound delivery handle for one session.
///
/// Implementations must not block: delivery happens while fanning out to
/// every subscriber, and one slow session must not hold up the others.
#[cfg_attr(test, mockall::automock)]
pub trait SessionSink: Send + Sync {
    /// Queue a frame for the session, preserving call order.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the frame cannot be queued.
    fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError>;
}

/// Shared sink handle stored in the session registry.
pub type SharedSink = Arc<dyn SessionSink>;

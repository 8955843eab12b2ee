//! Transport Port (Driven Port)
//!
//! Opens one full-duplex text connection. The connection manager owns the
//! protocol; a transport only moves frames.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inbound event from an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// The connection closed or failed.
    Closed,
}

/// Both directions of an open connection.
///
/// Dropping `outbound` asks the transport to close the connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Text frames to send, in order.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames received, in order. Ends after `Frame::Closed` or when the connection drops.
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

/// Transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be opened.
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    /// The endpoint is not a valid URL for this transport.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Opens connections to the broadcast server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<TransportLink, TransportError>;
}

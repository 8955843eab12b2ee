//! In-Memory Transport
//!
//! A `Transport` whose "server" is a channel of accepted connections. Used by
//! tests and for wiring the manager to an in-process broadcaster.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_protocol::{Envelope, JsonCodec};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::application::ports::{Frame, Transport, TransportError, TransportLink};

/// Server side of one in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    endpoint: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Frame>,
}

impl MemoryConnection {
    /// Endpoint the client connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Next frame from the client; `None` once the client dropped the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame from the client if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Send a raw text frame. Returns `false` if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Frame::Text(text.into())).is_ok()
    }

    /// Encode and send an envelope. Returns `false` if the client is gone.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match JsonCodec::new().encode(envelope) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode envelope");
                false
            }
        }
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.to_client.send(Frame::Closed);
    }
}

/// Transport backed by channels.
#[derive(Debug)]
pub struct MemoryTransport {
    accepted: mpsc::UnboundedSender<MemoryConnection>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
}

impl MemoryTransport {
    /// Create a transport and the receiver of connections it accepts.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryConnection>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            accepted,
            refusing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
        });
        (transport, rx)
    }

    /// Make every following connect fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Connect attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// When each connect attempt happened.
    #[must_use]
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, endpoint: &str) -> Result<TransportLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(Instant::now());

        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("connection refused".to_string()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let connection = MemoryConnection {
            endpoint: endpoint.to_string(),
            from_client,
            to_client,
        };
        self.accepted
            .send(connection)
            .map_err(|_| TransportError::ConnectFailed("no listener".to_string()))?;

        Ok(TransportLink { outbound, inbound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_carries_frames_both_ways() {
        let (transport, mut accepted) = MemoryTransport::new();
        let mut link = transport.connect("memory://a").await.unwrap();
        let mut connection = accepted.recv().await.unwrap();
        assert_eq!(connection.endpoint(), "memory://a");

        link.outbound.send("hello".to_string()).unwrap();
        assert_eq!(connection.recv().await.as_deref(), Some("hello"));

        assert!(connection.send_text("world"));
        assert_eq!(link.inbound.recv().await, Some(Frame::Text("world".to_string())));

        connection.close();
        assert_eq!(link.inbound.recv().await, Some(Frame::Closed));
    }

    #[tokio::test]
    async fn refusing_transport_counts_attempts() {
        let (transport, _accepted) = MemoryTransport::new();
        transport.set_refusing(true);
        assert!(transport.connect("memory://a").await.is_err());
        assert!(transport.connect("memory://a").await.is_err());
        assert_eq!(transport.attempts(), 2);
    }
}

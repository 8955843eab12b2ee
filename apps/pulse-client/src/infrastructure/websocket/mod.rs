//! WebSocket Transport
//!
//! `tokio-tungstenite` adapter for the `Transport` port. Each connection is
//! driven by one task that forwards outbound text frames and inbound text
//! messages until either side closes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{Frame, Transport, TransportError, TransportLink};

/// WebSocket transport over `ws://` and `wss://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    /// Create the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, endpoint: &str) -> Result<TransportLink, TransportError> {
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => {
                        let Some(text) = frame else {
                            tracing::debug!("Outbound closed, closing WebSocket");
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        if let Err(e) = write.send(Message::text(text)).await {
                            tracing::warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if inbound_tx.send(Frame::Text(text.as_str().to_owned())).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if write.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                tracing::info!("Server sent close frame");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "WebSocket read failed");
                                break;
                            }
                            None => {
                                tracing::info!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            let _ = inbound_tx.send(Frame::Closed);
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

//! WebSocket Session Adapter
//!
//! Bridges one axum WebSocket to the broadcast channel:
//!
//! ```text
//!             ┌──────────────┐  try_deliver  ┌─────────────┐   send    ┌────────┐
//! broadcast ─►│ QueueSink    │──────────────►│ mpsc queue  │──────────►│ socket │
//!             └──────────────┘               └─────────────┘  (writer) └────────┘
//! socket ──► on_message (subscribe / unsubscribe)
//! ```
//!
//! The per-session queue keeps server-side send order and isolates slow
//! clients: once it is full, deliveries to that session fail fast.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DeliveryError, Frame, SessionSink};
use crate::application::services::BroadcastChannel;
use crate::infrastructure::http::AppState;
use crate::infrastructure::metrics;

// =============================================================================
// Queue Sink
// =============================================================================

/// `SessionSink` backed by a bounded per-session queue.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: mpsc::Sender<Frame>,
}

impl QueueSink {
    /// Create a sink and the receiving end its writer task drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SessionSink for QueueSink {
    fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(
            socket,
            Arc::clone(state.channel()),
            state.session_queue_capacity(),
            state.shutdown().clone(),
        )
    })
}

/// Drive one session until the client leaves or the server shuts down.
pub async fn handle_socket(
    socket: WebSocket,
    channel: Arc<BroadcastChannel>,
    queue_capacity: usize,
    shutdown: CancellationToken,
) {
    let (sink, mut rx) = QueueSink::channel(queue_capacity);
    let session_id = channel.on_connect(Arc::new(sink));

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let writer_shutdown = shutdown.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_shutdown.cancelled() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = ws_sender.send(Message::Text((&*frame).into())).await {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    channel.on_message(session_id, text.as_str());
                }
                Some(Ok(Message::Binary(_))) => {
                    metrics::record_malformed_frame();
                    tracing::warn!(session_id = %session_id, "Dropping binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    }

    channel.on_disconnect(session_id);
    let _ = writer.await;
}

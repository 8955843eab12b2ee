//! Connection Manager
//!
//! One logical connection to the broadcast server, shared by every local
//! subscriber in the process. Construct it once and hand out clones.
//!
//! # Lifecycle
//!
//! Each `connect()` starts a supervisor task tied to its own cancellation
//! token:
//!
//! ```text
//! connecting ──► connected ──(read until closed)──► disconnected
//!     ▲              │                                   │
//!     │              └─ reset attempts, replay topics    │
//!     └──────────── sleep(backoff) ◄─────────────────────┘
//! ```
//!
//! `disconnect()` cancels the token, so no reconnect timer outlives it.
//! Subscription state and the outbound half of the link live under one
//! lock, which keeps "first subscriber sends subscribe" and "open replays
//! every topic" from racing into duplicates or omissions.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pulse_protocol::{ClientCommand, JsonCodec, Topic};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Frame, SharedSubscriber, Subscriber, Transport, TransportLink};
use crate::domain::connection::{
    ConnectionEvent, ConnectionState, ReconnectConfig, ReconnectPolicy,
};
use crate::domain::subscription::{SubscriptionId, SubscriptionRegistry};

/// Buffered lifecycle events per `events()` receiver.
const EVENT_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server endpoint, e.g. `ws://localhost:8090/ws`.
    pub endpoint: String,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    /// Doubling backoff from `base_delay`, giving up after `max_attempts` failures.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectConfig::new(base_delay, max_attempts),
        }
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Shared handle to the process-wide connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    codec: JsonCodec,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
}

struct Shared {
    registry: SubscriptionRegistry<SharedSubscriber>,
    /// Present only while connected.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Token of the running supervisor, if any.
    lifecycle: Option<CancellationToken>,
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    /// Create a manager. Nothing connects until `connect()`.
    #[must_use]
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                endpoint: config.endpoint,
                transport,
                codec: JsonCodec::new(),
                shared: Mutex::new(Shared {
                    registry: SubscriptionRegistry::new(),
                    outbound: None,
                    lifecycle: None,
                    policy: ReconnectPolicy::new(config.reconnect),
                }),
                state_tx,
                events_tx,
            }),
        }
    }

    /// Start connecting. A no-op while a connection lifecycle is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.lifecycle.is_some() {
            tracing::debug!("Connection lifecycle already running");
            return;
        }
        self.start_lifecycle(&mut shared);
    }

    /// Retry immediately with a fresh attempt counter.
    ///
    /// Used for a manual "try again" and when the network comes back. A
    /// pending backoff timer is cancelled. No-op while connected.
    pub fn reconnect_now(&self) {
        let mut shared = self.inner.shared.lock();
        if self.state().is_connected() {
            return;
        }
        if let Some(previous) = shared.lifecycle.take() {
            previous.cancel();
        }
        shared.policy.reset();
        tracing::info!("Manual reconnect requested");
        self.start_lifecycle(&mut shared);
    }

    /// Register `subscriber` for `topic`.
    ///
    /// Sends a wire-level subscribe when this is the topic's first local
    /// subscriber and the connection is open; otherwise the next open replays it.
    pub fn subscribe<S>(&self, topic: Topic, subscriber: S) -> SubscriptionId
    where
        S: Subscriber + 'static,
    {
        self.subscribe_shared(topic, Arc::new(subscriber))
    }

    /// Register an already shared subscriber for `topic`.
    pub fn subscribe_shared(&self, topic: Topic, subscriber: SharedSubscriber) -> SubscriptionId {
        let mut shared = self.inner.shared.lock();
        let added = shared.registry.add(topic, subscriber);

        if added.first_for_topic
            && topic.is_wire_subscribable()
            && let Some(outbound) = &shared.outbound
        {
            self.inner.send_command(outbound, ClientCommand::subscribe(topic));
        }

        tracing::debug!(subscription_id = %added.id, %topic, "Subscription added");
        added.id
    }

    /// Remove a local subscription. Returns `false` for unknown ids.
    ///
    /// The last local subscriber for a topic sends a wire-level unsubscribe,
    /// but only while connected: the server forgets everything on disconnect.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut shared = self.inner.shared.lock();
        let Some(removed) = shared.registry.remove(id) else {
            return false;
        };

        if removed.last_for_topic
            && removed.topic.is_wire_subscribable()
            && let Some(outbound) = &shared.outbound
        {
            self.inner
                .send_command(outbound, ClientCommand::unsubscribe(removed.topic));
        }

        tracing::debug!(subscription_id = %id, topic = %removed.topic, "Subscription removed");
        true
    }

    /// Clear every subscription and close the connection. No reconnect follows.
    pub fn disconnect(&self) {
        let was_open = {
            let mut shared = self.inner.shared.lock();
            if let Some(lifecycle) = shared.lifecycle.take() {
                lifecycle.cancel();
            }
            shared.registry.clear();
            shared.policy.reset();

            let was_open = shared.outbound.take().is_some();
            if self.state() != ConnectionState::Disconnected {
                self.inner.set_state(ConnectionState::Closing);
                self.inner.set_state(ConnectionState::Disconnected);
            }
            was_open
        };

        if was_open {
            self.inner.emit(ConnectionEvent::Disconnected);
        }
        tracing::info!("Disconnected from broadcast server");
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Observe connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Observe lifecycle events from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Number of local subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.shared.lock().registry.len()
    }

    /// Distinct topics with at least one local subscriber.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.inner.shared.lock().registry.topics()
    }

    fn start_lifecycle(&self, shared: &mut Shared) {
        let cancel = CancellationToken::new();
        shared.lifecycle = Some(cancel.clone());
        tokio::spawn(Arc::clone(&self.inner).supervise(cancel));
    }
}

// =============================================================================
// Supervisor
// =============================================================================

impl Inner {
    async fn supervise(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if !self.transition(&cancel, ConnectionState::Connecting) {
                return;
            }
            tracing::info!(endpoint = %self.endpoint, "Connecting to broadcast server");

            let result = tokio::select! {
                () = cancel.cancelled() => return,
                result = self.transport.connect(&self.endpoint) => result,
            };

            match result {
                Ok(TransportLink { outbound, inbound }) => {
                    if !self.on_open(&cancel, outbound) {
                        return;
                    }
                    self.read_until_closed(inbound, &cancel).await;
                    tracing::warn!("Connection to broadcast server lost");
                }
                Err(e) => {
                    tracing::warn!(endpoint = %self.endpoint, error = %e, "Connection attempt failed");
                }
            }

            if !self.on_close(&cancel) {
                return;
            }

            let Some(delay) = self.schedule_reconnect(&cancel) else {
                return;
            };
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Set `state` unless this lifecycle has been cancelled.
    fn transition(&self, cancel: &CancellationToken, state: ConnectionState) -> bool {
        let _shared = self.shared.lock();
        if cancel.is_cancelled() {
            return false;
        }
        self.set_state(state);
        true
    }

    fn on_open(&self, cancel: &CancellationToken, outbound: mpsc::UnboundedSender<String>) -> bool {
        let replayed = {
            let mut shared = self.shared.lock();
            if cancel.is_cancelled() {
                return false;
            }

            shared.policy.reset();
            let topics: Vec<Topic> = shared
                .registry
                .topics()
                .into_iter()
                .filter(|topic| topic.is_wire_subscribable())
                .collect();
            for topic in &topics {
                self.send_command(&outbound, ClientCommand::subscribe(*topic));
            }

            shared.outbound = Some(outbound);
            self.set_state(ConnectionState::Connected);
            topics.len()
        };

        tracing::info!(replayed, "Connected to broadcast server");
        self.emit(ConnectionEvent::Connected { replayed });
        true
    }

    fn on_close(&self, cancel: &CancellationToken) -> bool {
        {
            let mut shared = self.shared.lock();
            if cancel.is_cancelled() {
                return false;
            }
            shared.outbound = None;
            self.set_state(ConnectionState::Disconnected);
        }
        self.emit(ConnectionEvent::Disconnected);
        true
    }

    fn schedule_reconnect(&self, cancel: &CancellationToken) -> Option<Duration> {
        let event = {
            let mut shared = self.shared.lock();
            if cancel.is_cancelled() {
                return None;
            }
            match shared.policy.next_delay() {
                Some(delay) => ConnectionEvent::ReconnectScheduled {
                    attempt: shared.policy.attempt_count(),
                    delay,
                },
                None => {
                    shared.lifecycle = None;
                    ConnectionEvent::ReconnectExhausted {
                        attempts: shared.policy.attempt_count(),
                    }
                }
            }
        };

        let delay = match &event {
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Reconnecting to broadcast server"
                );
                Some(*delay)
            }
            ConnectionEvent::ReconnectExhausted { attempts } => {
                tracing::warn!(attempts, "Reconnect attempts exhausted, waiting for manual retry");
                None
            }
            ConnectionEvent::Connected { .. } | ConnectionEvent::Disconnected => None,
        };
        self.emit(event);
        delay
    }

    async fn read_until_closed(
        &self,
        mut inbound: mpsc::UnboundedReceiver<Frame>,
        cancel: &CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => return,
                frame = inbound.recv() => frame,
            };
            match frame {
                Some(Frame::Text(text)) => self.dispatch(&text),
                Some(Frame::Closed) | None => return,
            }
        }
    }

    /// Deliver one envelope to every matching subscriber.
    fn dispatch(&self, text: &str) {
        let envelope = match self.codec.decode_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed envelope");
                return;
            }
        };

        let subscribers = self.shared.lock().registry.matching(envelope.kind);
        for (id, subscriber) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| subscriber.notify(&envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    subscription_id = %id,
                    topic = %envelope.kind,
                    error = %e,
                    "Subscriber failed"
                ),
                Err(_) => tracing::error!(
                    subscription_id = %id,
                    topic = %envelope.kind,
                    "Subscriber panicked"
                ),
            }
        }
    }

    fn send_command(&self, outbound: &mpsc::UnboundedSender<String>, command: ClientCommand) {
        let frame = match self.codec.encode(&command) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(topic = %command.topic, error = %e, "Failed to encode command");
                return;
            }
        };
        if outbound.send(frame).is_err() {
            tracing::debug!(topic = %command.topic, "Link closed before command was sent");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pulse_protocol::{CommandAction, Envelope};
    use serde_json::json;

    use super::*;
    use crate::infrastructure::memory::{MemoryConnection, MemoryTransport};

    fn manager(transport: &Arc<MemoryTransport>) -> ConnectionManager {
        ConnectionManager::new(
            ConnectionConfig::new("memory://pulse", Duration::from_millis(100), 4),
            Arc::clone(transport) as Arc<dyn Transport>,
        )
    }

    fn noop() -> impl Subscriber + 'static {
        |_: &Envelope| -> anyhow::Result<()> { Ok(()) }
    }

    async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
        let mut rx = manager.watch_state();
        rx.wait_for(|current| *current == state).await.unwrap();
    }

    fn drain_commands(connection: &mut MemoryConnection) -> Vec<ClientCommand> {
        let codec = JsonCodec::new();
        std::iter::from_fn(|| connection.try_recv())
            .map(|frame| codec.decode_command(&frame).unwrap())
            .collect()
    }

    #[test]
    fn configured_backoff_keeps_doubling() {
        let config = ConnectionConfig::new("ws://localhost:8090/ws", Duration::from_secs(10), 6);
        let mut policy = ReconnectPolicy::new(config.reconnect);
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay())
            .map(|delay| delay.as_secs())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320]);
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let (transport, _accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.subscription_count(), 0);
    }

    #[tokio::test]
    async fn first_subscriber_sends_one_wire_subscribe() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();
        let mut connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        let first = manager.subscribe(Topic::Price, noop());
        let second = manager.subscribe(Topic::Price, noop());
        assert_eq!(
            drain_commands(&mut connection),
            vec![ClientCommand::subscribe(Topic::Price)]
        );

        assert!(manager.unsubscribe(first));
        assert!(drain_commands(&mut connection).is_empty());
        assert!(manager.unsubscribe(second));
        assert_eq!(
            drain_commands(&mut connection),
            vec![ClientCommand::unsubscribe(Topic::Price)]
        );
        assert!(!manager.unsubscribe(second));
    }

    #[tokio::test]
    async fn system_topic_is_never_sent() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();
        let mut connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.subscribe(Topic::System, noop());
        assert!(drain_commands(&mut connection).is_empty());
    }

    #[tokio::test]
    async fn dispatch_isolates_failing_and_panicking_subscribers() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.subscribe(Topic::Trade, |_: &Envelope| -> anyhow::Result<()> {
            anyhow::bail!("broken widget")
        });
        manager.subscribe(Topic::Trade, |_: &Envelope| -> anyhow::Result<()> {
            panic!("widget panicked")
        });
        manager.subscribe(Topic::Trade, tx);

        manager.connect();
        let connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        connection.send_envelope(&Envelope::new(Topic::Trade, json!({ "symbol": "AAPL" })));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.data["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn malformed_envelope_is_dropped() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.subscribe(Topic::News, tx);

        manager.connect();
        let connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        connection.send_text("{ not json");
        connection.send_envelope(&Envelope::new(Topic::News, json!({ "headline": "ok" })));
        assert_eq!(rx.recv().await.unwrap().kind, Topic::News);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn disconnect_clears_subscriptions_and_closes_link() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        manager.subscribe(Topic::Alert, noop());
        manager.connect();
        let mut connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.subscription_count(), 0);

        assert_eq!(
            connection.recv().await.map(|f| JsonCodec::new().decode_command(&f).unwrap().action),
            Some(CommandAction::Subscribe)
        );
        assert!(connection.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (transport, _accepted) = MemoryTransport::new();
        transport.set_refusing(true);
        let manager = manager(&transport);
        let mut events = manager.events();

        manager.connect();
        loop {
            if let ConnectionEvent::ReconnectScheduled { .. } = events.recv().await.unwrap() {
                break;
            }
        }
        manager.disconnect();
        let attempts = transport.attempts();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.attempts(), attempts);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_twice_is_a_noop() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();
        manager.connect();
        let _connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn subscriber_can_resubscribe_from_callback() {
        let (transport, mut accepted) = MemoryTransport::new();
        let manager = manager(&transport);
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_manager = manager.clone();
        let inner_calls = Arc::clone(&calls);
        manager.subscribe(Topic::Market, move |_: &Envelope| -> anyhow::Result<()> {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            inner_manager.subscribe(Topic::News, noop());
            Ok(())
        });

        manager.connect();
        let connection = accepted.recv().await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;
        connection.send_envelope(&Envelope::new(Topic::Market, json!({})));

        tokio::time::timeout(Duration::from_secs(1), async {
            while manager.subscription_count() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Broadcast Channel
//!
//! Accepts sessions, applies their subscribe/unsubscribe commands, and fans
//! out envelopes to every session subscribed to the envelope's topic or to
//! the `all` wildcard.
//!
//! Delivery is push-only: a session that is not connected or not subscribed
//! at broadcast time permanently misses that envelope. The only replay is
//! the latest value per topic, sent once to a session when it subscribes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use pulse_protocol::{
    ClientCommand, CodecError, CommandAction, Envelope, JsonCodec, SystemNotice, Topic,
};
use serde::Serialize;

use crate::application::ports::{Frame, SharedSink};
use crate::domain::session::{RegistryStats, SessionId, SessionRegistry, SubscribeOutcome};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Broadcast channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Message carried by the welcome envelope.
    pub welcome_message: String,
    /// Send the latest value of a topic to a session when it subscribes.
    pub snapshot_on_subscribe: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            welcome_message: "Connected to Pulse real-time feed".to_string(),
            snapshot_on_subscribe: true,
        }
    }
}

// =============================================================================
// Reports and Errors
// =============================================================================

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Sessions matched at broadcast time.
    pub recipients: usize,
    /// Sessions the frame was queued for.
    pub delivered: usize,
    /// Sessions whose delivery failed.
    pub failed: usize,
}

/// Broadcast channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// `system` and `all` cannot be broadcast through subscription routing.
    #[error("topic {0} cannot be broadcast")]
    NotRoutable(Topic),

    /// Payload could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// =============================================================================
// Broadcast Channel
// =============================================================================

/// Server side of the dashboard's real-time channel.
pub struct BroadcastChannel {
    config: ChannelConfig,
    codec: JsonCodec,
    registry: SessionRegistry<SharedSink>,
    snapshots: RwLock<HashMap<Topic, serde_json::Value>>,
}

impl BroadcastChannel {
    /// Create a channel with no sessions.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            registry: SessionRegistry::new(),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and send it the welcome envelope.
    pub fn on_connect(&self, sink: SharedSink) -> SessionId {
        let session_id = SessionId::new();
        self.registry.register(session_id, Arc::clone(&sink));
        metrics::set_sessions(self.registry.session_count());

        let notice = SystemNotice::welcome(session_id.to_string(), &self.config.welcome_message);
        match self.encode(&Envelope::new(Topic::System, notice)) {
            Ok(frame) => {
                Self::deliver(session_id, &sink, Topic::System, frame);
            }
            Err(e) => tracing::error!(session_id = %session_id, error = %e, "Failed to encode welcome"),
        }

        tracing::info!(session_id = %session_id, "Session connected");
        session_id
    }

    /// Handle one inbound text frame from a session.
    ///
    /// Malformed frames are logged and dropped. Returns the applied command.
    pub fn on_message(&self, session_id: SessionId, raw: &str) -> Option<ClientCommand> {
        let command = match self.codec.decode_command(raw) {
            Ok(command) => command,
            Err(e) => {
                metrics::record_malformed_frame();
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Dropping malformed client frame"
                );
                return None;
            }
        };

        metrics::record_command(command.action);
        match command.action {
            CommandAction::Subscribe => {
                self.subscribe(session_id, command.topic);
            }
            CommandAction::Unsubscribe => {
                self.unsubscribe(session_id, command.topic);
            }
        }
        Some(command)
    }

    /// Add a topic to a session and send the topic's latest value if known.
    ///
    /// The snapshot goes out only when the topic is newly added. A broadcast
    /// that lands between the registry update and the snapshot read reaches
    /// the session twice: live, then again as the snapshot. Both copies carry
    /// the newest value.
    pub fn subscribe(&self, session_id: SessionId, topic: Topic) -> SubscribeOutcome {
        let outcome = self.registry.subscribe(session_id, topic);
        match outcome {
            SubscribeOutcome::UnknownSession => {
                tracing::debug!(session_id = %session_id, %topic, "Subscribe from unknown session");
            }
            SubscribeOutcome::AlreadySubscribed => {
                tracing::debug!(session_id = %session_id, %topic, "Session already subscribed");
            }
            SubscribeOutcome::Added => {
                tracing::debug!(session_id = %session_id, %topic, "Session subscribed");
                self.publish_topic_gauges();
                if self.config.snapshot_on_subscribe {
                    self.send_snapshot(session_id, topic);
                }
            }
        }
        outcome
    }

    /// Remove a topic from a session.
    pub fn unsubscribe(&self, session_id: SessionId, topic: Topic) -> bool {
        let removed = self.registry.unsubscribe(session_id, topic);
        if removed {
            tracing::debug!(session_id = %session_id, %topic, "Session unsubscribed");
            self.publish_topic_gauges();
        }
        removed
    }

    /// Drop a session and its subscriptions.
    pub fn on_disconnect(&self, session_id: SessionId) -> bool {
        let Some(topics) = self.registry.remove(session_id) else {
            return false;
        };
        metrics::set_sessions(self.registry.session_count());
        self.publish_topic_gauges();
        tracing::info!(
            session_id = %session_id,
            topics = topics.len(),
            "Session disconnected"
        );
        true
    }

    /// Fan out `data` on `topic` to every matching session.
    ///
    /// The value also becomes the topic's latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::NotRoutable` for `system` and `all`.
    pub fn broadcast(
        &self,
        topic: Topic,
        data: serde_json::Value,
    ) -> Result<BroadcastReport, ChannelError> {
        if !topic.is_routed() {
            return Err(ChannelError::NotRoutable(topic));
        }

        let envelope = Envelope::new(topic, data);
        let frame = self.encode(&envelope)?;
        self.snapshots.write().insert(topic, envelope.data);

        let recipients = self.registry.recipients(topic);
        let report = Self::fan_out(topic, &recipients, &frame);
        metrics::record_broadcast(topic, report.recipients, report.delivered);
        Ok(report)
    }

    /// Serialize a typed payload and broadcast it.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is not routable or the payload cannot be encoded.
    pub fn broadcast_payload<T: Serialize>(
        &self,
        topic: Topic,
        payload: &T,
    ) -> Result<BroadcastReport, ChannelError> {
        let data = serde_json::to_value(payload).map_err(CodecError::from)?;
        self.broadcast(topic, data)
    }

    /// Send a `system` envelope to every open session.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn announce<T: Serialize>(&self, payload: &T) -> Result<BroadcastReport, ChannelError> {
        let data = serde_json::to_value(payload).map_err(CodecError::from)?;
        let frame = self.encode(&Envelope::new(Topic::System, data))?;
        let recipients = self.registry.all();
        Ok(Self::fan_out(Topic::System, &recipients, &frame))
    }

    /// Seed or replace the latest value for a topic without broadcasting it.
    pub fn set_snapshot(&self, topic: Topic, data: serde_json::Value) {
        self.snapshots.write().insert(topic, data);
    }

    /// Latest value broadcast or seeded for a topic.
    #[must_use]
    pub fn snapshot(&self, topic: Topic) -> Option<serde_json::Value> {
        self.snapshots.read().get(&topic).cloned()
    }

    /// Topics currently held by a session.
    #[must_use]
    pub fn session_topics(&self, session_id: SessionId) -> Vec<Topic> {
        self.registry.session_topics(session_id)
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn encode<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<Frame, CodecError> {
        self.codec.encode(envelope).map(Frame::from)
    }

    fn send_snapshot(&self, session_id: SessionId, topic: Topic) {
        let Some(data) = self.snapshot(topic) else {
            return;
        };
        let Some(sink) = self.registry.sink(session_id) else {
            return;
        };
        match self.encode(&Envelope::new(topic, data)) {
            Ok(frame) => {
                Self::deliver(session_id, &sink, topic, frame);
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, %topic, error = %e, "Failed to encode snapshot");
            }
        }
    }

    fn fan_out(
        topic: Topic,
        recipients: &[(SessionId, SharedSink)],
        frame: &Frame,
    ) -> BroadcastReport {
        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };
        for (session_id, sink) in recipients {
            if Self::deliver(*session_id, sink, topic, Arc::clone(frame)) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    fn deliver(session_id: SessionId, sink: &SharedSink, topic: Topic, frame: Frame) -> bool {
        match sink.try_deliver(frame) {
            Ok(()) => true,
            Err(e) => {
                metrics::record_delivery_failure(topic, e);
                tracing::warn!(
                    session_id = %session_id,
                    %topic,
                    error = %e,
                    "Failed to deliver frame to session"
                );
                false
            }
        }
    }

    fn publish_topic_gauges(&self) {
        let stats = self.registry.stats();
        for topic in Topic::ROUTED.iter().chain(&[Topic::All, Topic::System]) {
            let count = stats.per_topic.get(topic).copied().unwrap_or(0);
            metrics::set_topic_subscribers(*topic, count);
        }
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

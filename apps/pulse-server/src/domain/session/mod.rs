//! Session Registry
//!
//! Tracks connected sessions and the topics each one subscribed to.
//!
//! # Design
//!
//! The registry tracks:
//! - One entry per open connection, created on connect and dropped on disconnect
//! - The set of topics each session subscribed to (unique, unordered)
//! - Reference counts per topic for stats and metrics
//!
//! Recipients are resolved at broadcast time from the current sets, so a
//! session that subscribes after a broadcast never sees it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse_protocol::Topic;
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// Opaque handle for one open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Result of adding a topic to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Topic was added to the session's set.
    Added,
    /// Session already held the topic.
    AlreadySubscribed,
    /// No session with that id is registered.
    UnknownSession,
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Open sessions.
    pub sessions: usize,
    /// Total (session, topic) pairs.
    pub subscriptions: usize,
    /// Subscriber count per topic.
    pub per_topic: BTreeMap<Topic, usize>,
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug)]
struct SessionEntry<S> {
    sink: S,
    topics: HashSet<Topic>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RegistryState<S> {
    sessions: HashMap<SessionId, SessionEntry<S>>,
    topic_refcount: HashMap<Topic, usize>,
}

impl<S> Default for RegistryState<S> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            topic_refcount: HashMap::new(),
        }
    }
}

impl<S> RegistryState<S> {
    fn release_topics(&mut self, topics: impl IntoIterator<Item = Topic>) {
        for topic in topics {
            if let Some(count) = self.topic_refcount.get_mut(&topic) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.topic_refcount.remove(&topic);
                }
            }
        }
    }
}

// =============================================================================
// Session Registry
// =============================================================================

/// Thread-safe registry of open sessions.
///
/// `S` is the outbound delivery handle stored per session; it is cloned out
/// of the lock so sends never run while the registry is locked.
///
/// # Example
///
/// ```rust
/// use pulse_protocol::Topic;
/// use pulse_server::domain::session::{SessionId, SessionRegistry, SubscribeOutcome};
///
/// let registry: SessionRegistry<&str> = SessionRegistry::new();
/// let id = SessionId::new();
/// registry.register(id, "sink");
///
/// assert_eq!(registry.subscribe(id, Topic::Price), SubscribeOutcome::Added);
/// assert_eq!(registry.recipients(Topic::Price).len(), 1);
/// assert!(registry.recipients(Topic::Trade).is_empty());
/// ```
pub struct SessionRegistry<S> {
    state: RwLock<RegistryState<S>>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }
}

impl<S: Clone> SessionRegistry<S> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session with an empty subscription set.
    ///
    /// Returns `false` if the id was already registered (the entry is left untouched).
    pub fn register(&self, id: SessionId, sink: S) -> bool {
        let mut state = self.state.write();
        if state.sessions.contains_key(&id) {
            return false;
        }
        state.sessions.insert(
            id,
            SessionEntry {
                sink,
                topics: HashSet::new(),
                connected_at: Utc::now(),
            },
        );
        true
    }

    /// Add a topic to a session's set.
    pub fn subscribe(&self, id: SessionId, topic: Topic) -> SubscribeOutcome {
        let mut state = self.state.write();
        let Some(entry) = state.sessions.get_mut(&id) else {
            return SubscribeOutcome::UnknownSession;
        };
        if !entry.topics.insert(topic) {
            return SubscribeOutcome::AlreadySubscribed;
        }
        *state.topic_refcount.entry(topic).or_insert(0) += 1;
        SubscribeOutcome::Added
    }

    /// Remove a topic from a session's set.
    ///
    /// Returns `true` if the session held the topic.
    pub fn unsubscribe(&self, id: SessionId, topic: Topic) -> bool {
        let mut state = self.state.write();
        let removed = state
            .sessions
            .get_mut(&id)
            .is_some_and(|entry| entry.topics.remove(&topic));
        if removed {
            state.release_topics([topic]);
        }
        removed
    }

    /// Drop a session and its subscription set.
    ///
    /// Returns the topics the session held, or `None` if it was not registered.
    pub fn remove(&self, id: SessionId) -> Option<Vec<Topic>> {
        let mut state = self.state.write();
        let entry = state.sessions.remove(&id)?;
        let topics: Vec<Topic> = entry.topics.into_iter().collect();
        state.release_topics(topics.iter().copied());
        Some(topics)
    }

    /// Sessions that should receive an envelope of type `topic`.
    ///
    /// A session matches when its set contains `topic` or the wildcard.
    #[must_use]
    pub fn recipients(&self, topic: Topic) -> Vec<(SessionId, S)> {
        let state = self.state.read();
        state
            .sessions
            .iter()
            .filter(|(_, entry)| entry.topics.iter().any(|t| t.accepts(topic)))
            .map(|(id, entry)| (*id, entry.sink.clone()))
            .collect()
    }

    /// Every open session.
    #[must_use]
    pub fn all(&self) -> Vec<(SessionId, S)> {
        self.state
            .read()
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.sink.clone()))
            .collect()
    }

    /// Delivery handle for one session.
    #[must_use]
    pub fn sink(&self, id: SessionId) -> Option<S> {
        self.state.read().sessions.get(&id).map(|e| e.sink.clone())
    }

    /// Topics held by one session.
    #[must_use]
    pub fn session_topics(&self, id: SessionId) -> Vec<Topic> {
        self.state
            .read()
            .sessions
            .get(&id)
            .map(|e| e.topics.iter().copied().collect())
            .unwrap_or_default()
    }

    /// When a session connected.
    #[must_use]
    pub fn connected_at(&self, id: SessionId) -> Option<DateTime<Utc>> {
        self.state.read().sessions.get(&id).map(|e| e.connected_at)
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Snapshot of registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let per_topic: BTreeMap<Topic, usize> = state
            .topic_refcount
            .iter()
            .map(|(topic, count)| (*topic, *count))
            .collect();
        RegistryStats {
            sessions: state.sessions.len(),
            subscriptions: per_topic.values().sum(),
            per_topic,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    fn registry_with(ids: &[SessionId]) -> SessionRegistry<u32> {
        let registry = SessionRegistry::new();
        for (n, id) in ids.iter().enumerate() {
            registry.register(*id, u32::try_from(n).unwrap());
        }
        registry
    }

    #[test]
    fn register_twice_keeps_first_entry() {
        let id = SessionId::new();
        let registry = SessionRegistry::new();
        assert!(registry.register(id, 1));
        assert!(!registry.register(id, 2));
        assert_eq!(registry.sink(id), Some(1));
    }

    #[test]
    fn new_session_has_no_topics() {
        let id = SessionId::new();
        let registry = registry_with(&[id]);
        assert!(registry.session_topics(id).is_empty());
        assert!(registry.connected_at(id).is_some());
        for topic in Topic::ROUTED {
            assert!(registry.recipients(topic).is_empty());
        }
    }

    #[test]
    fn subscribe_outcomes() {
        let id = SessionId::new();
        let registry = registry_with(&[id]);

        assert_eq!(registry.subscribe(id, Topic::News), SubscribeOutcome::Added);
        assert_eq!(
            registry.subscribe(id, Topic::News),
            SubscribeOutcome::AlreadySubscribed
        );
        assert_eq!(
            registry.subscribe(SessionId::new(), Topic::News),
            SubscribeOutcome::UnknownSession
        );
    }

    #[test]
    fn recipients_include_wildcard_sessions() {
        let (a, b, c) = (SessionId::new(), SessionId::new(), SessionId::new());
        let registry = registry_with(&[a, b, c]);
        registry.subscribe(a, Topic::Trade);
        registry.subscribe(b, Topic::All);
        registry.subscribe(c, Topic::Price);

        let mut ids: Vec<SessionId> = registry
            .recipients(Topic::Trade)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn session_with_topic_and_wildcard_is_listed_once() {
        let id = SessionId::new();
        let registry = registry_with(&[id]);
        registry.subscribe(id, Topic::Price);
        registry.subscribe(id, Topic::All);
        assert_eq!(registry.recipients(Topic::Price).len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let id = SessionId::new();
        let registry = registry_with(&[id]);
        registry.subscribe(id, Topic::Alert);

        assert!(registry.unsubscribe(id, Topic::Alert));
        assert!(!registry.unsubscribe(id, Topic::Alert));
        assert!(registry.recipients(Topic::Alert).is_empty());
    }

    #[test]
    fn remove_returns_held_topics_and_updates_stats() {
        let (a, b) = (SessionId::new(), SessionId::new());
        let registry = registry_with(&[a, b]);
        registry.subscribe(a, Topic::Price);
        registry.subscribe(a, Topic::Trade);
        registry.subscribe(b, Topic::Price);

        let mut topics = registry.remove(a).unwrap();
        topics.sort();
        assert_eq!(topics, vec![Topic::Trade, Topic::Price]);
        assert!(registry.remove(a).is_none());

        let stats = registry.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.subscriptions, 1);
        assert_eq!(stats.per_topic.get(&Topic::Price), Some(&1));
        assert!(!stats.per_topic.contains_key(&Topic::Trade));
    }

    #[test]
    fn concurrent_subscriptions_are_counted() {
        let registry = Arc::new(SessionRegistry::<usize>::new());
        let ids: Vec<SessionId> = (0..8).map(|_| SessionId::new()).collect();
        for (n, id) in ids.iter().enumerate() {
            registry.register(*id, n);
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                let id = *id;
                thread::spawn(move || {
                    for topic in Topic::ROUTED {
                        registry.subscribe(id, topic);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.sessions, 8);
        assert_eq!(stats.subscriptions, 8 * Topic::ROUTED.len());
    }

    fn topic_strategy() -> impl Strategy<Value = Topic> {
        prop::sample::select(vec![
            Topic::Trade,
            Topic::Price,
            Topic::Alert,
            Topic::News,
            Topic::Market,
            Topic::All,
        ])
    }

    proptest! {
        #[test]
        fn refcounts_match_session_sets(
            ops in prop::collection::vec((0usize..4, topic_strategy(), any::<bool>()), 0..64)
        ) {
            let ids: Vec<SessionId> = (0..4).map(|_| SessionId::new()).collect();
            let registry = registry_with(&ids);
            for (idx, topic, add) in ops {
                if add {
                    registry.subscribe(ids[idx], topic);
                } else {
                    registry.unsubscribe(ids[idx], topic);
                }
            }

            let stats = registry.stats();
            let held: usize = ids.iter().map(|id| registry.session_topics(*id).len()).sum();
            prop_assert_eq!(stats.subscriptions, held);
            for (topic, count) in &stats.per_topic {
                let actual = ids
                    .iter()
                    .filter(|id| registry.session_topics(**id).contains(topic))
                    .count();
                prop_assert_eq!(*count, actual);
            }
        }
    }
}

//! Local Subscription Registry
//!
//! Tracks every local subscription and the number of subscriptions per
//! topic. Many local subscriptions can share one topic while the server
//! only ever sees one wire-level subscription for it:
//!
//! - the first local subscription for a topic needs a wire `subscribe`
//! - removing the last one for a topic needs a wire `unsubscribe`
//!
//! The registry is plain data. Callers provide the locking.

use std::collections::BTreeMap;
use std::fmt;

use pulse_protocol::Topic;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a local subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Result of adding a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Added {
    /// Identifier of the new subscription.
    pub id: SubscriptionId,
    /// The topic had no local subscribers before this one.
    pub first_for_topic: bool,
}

/// Result of removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    /// Topic the subscription was for.
    pub topic: Topic,
    /// No local subscribers remain for the topic.
    pub last_for_topic: bool,
}

#[derive(Debug)]
struct Entry<S> {
    topic: Topic,
    subscriber: S,
}

// =============================================================================
// Registry
// =============================================================================

/// Local subscriptions with per-topic reference counts.
#[derive(Debug)]
pub struct SubscriptionRegistry<S> {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Entry<S>>,
    topic_refcount: BTreeMap<Topic, usize>,
}

impl<S> Default for SubscriptionRegistry<S> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            topic_refcount: BTreeMap::new(),
        }
    }
}

impl<S> SubscriptionRegistry<S> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `topic`.
    pub fn add(&mut self, topic: Topic, subscriber: S) -> Added {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Entry { topic, subscriber });

        let refcount = self.topic_refcount.entry(topic).or_insert(0);
        *refcount += 1;

        Added {
            id,
            first_for_topic: *refcount == 1,
        }
    }

    /// Remove a subscription. Returns `None` for unknown ids.
    pub fn remove(&mut self, id: SubscriptionId) -> Option<Removed> {
        let entry = self.entries.remove(&id)?;
        let topic = entry.topic;

        let last_for_topic = match self.topic_refcount.get_mut(&topic) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                self.topic_refcount.remove(&topic);
                true
            }
        };

        Some(Removed {
            topic,
            last_for_topic,
        })
    }

    /// Distinct topics with at least one local subscriber.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.topic_refcount.keys().copied().collect()
    }

    /// Number of local subscribers for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_refcount.get(&topic).copied().unwrap_or(0)
    }

    /// Total local subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no local subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.topic_refcount.clear();
    }
}

impl<S: Clone> SubscriptionRegistry<S> {
    /// Subscribers that should receive an envelope of type `kind`, in registration order.
    #[must_use]
    pub fn matching(&self, kind: Topic) -> Vec<(SubscriptionId, S)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.topic.accepts(kind))
            .map(|(id, entry)| (*id, entry.subscriber.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn first_and_last_subscriber_for_topic() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.add(Topic::Price, "a");
        let b = registry.add(Topic::Price, "b");
        assert!(a.first_for_topic);
        assert!(!b.first_for_topic);

        let removed = registry.remove(a.id).unwrap();
        assert_eq!(removed.topic, Topic::Price);
        assert!(!removed.last_for_topic);

        let removed = registry.remove(b.id).unwrap();
        assert!(removed.last_for_topic);
        assert!(registry.topics().is_empty());
    }

    #[test]
    fn removing_unknown_id_is_none() {
        let mut registry: SubscriptionRegistry<()> = SubscriptionRegistry::new();
        let added = registry.add(Topic::News, ());
        assert!(registry.remove(added.id).is_some());
        assert!(registry.remove(added.id).is_none());
    }

    #[test]
    fn matching_honours_wildcard() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(Topic::Price, "price");
        registry.add(Topic::Trade, "trade");
        registry.add(Topic::All, "all");

        let names: Vec<_> = registry
            .matching(Topic::Trade)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(names, vec!["trade", "all"]);
    }

    #[test]
    fn ids_are_unique_after_removal() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.add(Topic::Alert, ());
        registry.remove(first.id);
        let second = registry.add(Topic::Alert, ());
        assert_ne!(first.id, second.id);
        assert!(second.first_for_topic);
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(Topic::Price, ());
        registry.add(Topic::Market, ());
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.subscriber_count(Topic::Price), 0);
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
        fn refcounts_track_live_entries(
            ops in prop::collection::vec((topic_strategy(), any::<bool>(), any::<prop::sample::Index>()), 1..64)
        ) {
            let mut registry = SubscriptionRegistry::new();
            let mut live: Vec<(SubscriptionId, Topic)> = Vec::new();
            let mut wire: BTreeSet<Topic> = BTreeSet::new();

            for (topic, add, index) in ops {
                if add || live.is_empty() {
                    let added = registry.add(topic, ());
                    prop_assert_eq!(added.first_for_topic, wire.insert(topic));
                    live.push((added.id, topic));
                } else {
                    let (id, topic) = live.remove(index.index(live.len()));
                    let removed = registry.remove(id).unwrap();
                    let still_used = live.iter().any(|(_, t)| *t == topic);
                    prop_assert_eq!(removed.last_for_topic, !still_used);
                    if !still_used {
                        wire.remove(&topic);
                    }
                }

                prop_assert_eq!(registry.topics(), wire.iter().copied().collect::<Vec<_>>());
                prop_assert_eq!(registry.len(), live.len());
            }
        }
    }
}

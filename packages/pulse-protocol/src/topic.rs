//! Routing Topics
//!
//! A topic is a routing key, not a stored entity. Sessions subscribe to
//! topics and envelopes carry exactly one topic in their `type` field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named logical channel for message routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Executed trade alerts.
    Trade,
    /// Price ticks.
    Price,
    /// Price or volume alerts.
    Alert,
    /// News headlines.
    News,
    /// Market-wide snapshots (indices, breadth).
    Market,
    /// Connection lifecycle notices. Never routed by subscription.
    System,
    /// Wildcard: receives every routed topic.
    All,
}

impl Topic {
    /// Topics that carry data and can be broadcast by the server.
    pub const ROUTED: [Self; 5] = [
        Self::Trade,
        Self::Price,
        Self::Alert,
        Self::News,
        Self::Market,
    ];

    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Price => "price",
            Self::Alert => "alert",
            Self::News => "news",
            Self::Market => "market",
            Self::System => "system",
            Self::All => "all",
        }
    }

    /// Whether a subscription to `self` should receive an envelope of type `envelope_type`.
    #[must_use]
    pub fn accepts(self, envelope_type: Self) -> bool {
        self == envelope_type || self == Self::All
    }

    /// Whether the server can broadcast on this topic through subscription routing.
    #[must_use]
    pub const fn is_routed(self) -> bool {
        !matches!(self, Self::System | Self::All)
    }

    /// Whether the client sends a wire-level subscribe for this topic.
    ///
    /// `system` envelopes reach every session regardless of subscriptions.
    #[must_use]
    pub const fn is_wire_subscribable(self) -> bool {
        !matches!(self, Self::System)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a topic name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trade" => Ok(Self::Trade),
            "price" => Ok(Self::Price),
            "alert" => Ok(Self::Alert),
            "news" => Ok(Self::News),
            "market" => Ok(Self::Market),
            "system" => Ok(Self::System),
            "all" => Ok(Self::All),
            other => Err(UnknownTopic(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("trade", Topic::Trade)]
    #[test_case("PRICE", Topic::Price)]
    #[test_case(" alert ", Topic::Alert)]
    #[test_case("news", Topic::News)]
    #[test_case("market", Topic::Market)]
    #[test_case("system", Topic::System)]
    #[test_case("all", Topic::All)]
    fn parses_topic_names(input: &str, expected: Topic) {
        assert_eq!(input.parse::<Topic>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_topic() {
        let err = "crypto".parse::<Topic>().unwrap_err();
        assert_eq!(err, UnknownTopic("crypto".to_string()));
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Topic::Market).unwrap(), "\"market\"");
        assert_eq!(
            serde_json::from_str::<Topic>("\"all\"").unwrap(),
            Topic::All
        );
    }

    #[test]
    fn wildcard_accepts_every_topic() {
        for topic in Topic::ROUTED {
            assert!(Topic::All.accepts(topic));
        }
        assert!(Topic::All.accepts(Topic::System));
    }

    #[test]
    fn specific_topic_accepts_only_itself() {
        assert!(Topic::Trade.accepts(Topic::Trade));
        assert!(!Topic::Price.accepts(Topic::Trade));
        assert!(!Topic::Trade.accepts(Topic::All));
    }

    #[test]
    fn routing_flags() {
        assert!(Topic::ROUTED.iter().all(|t| t.is_routed()));
        assert!(!Topic::System.is_routed());
        assert!(!Topic::All.is_routed());
        assert!(Topic::All.is_wire_subscribable());
        assert!(!Topic::System.is_wire_subscribable());
    }

    #[test]
    fn display_matches_wire_name() {
        for topic in Topic::ROUTED {
            assert_eq!(topic.to_string(), topic.as_str());
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
    }
}

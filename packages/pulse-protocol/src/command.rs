//! Client-to-server subscription commands.

use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// Subscription action requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    /// Start receiving a topic.
    Subscribe,
    /// Stop receiving a topic.
    Unsubscribe,
}

impl CommandAction {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// `{ "action": "subscribe" | "unsubscribe", "type": "<topic>" }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientCommand {
    /// Requested action.
    pub action: CommandAction,
    /// Topic the action applies to.
    #[serde(rename = "type")]
    pub topic: Topic,
}

impl ClientCommand {
    /// Build a subscribe command.
    #[must_use]
    pub const fn subscribe(topic: Topic) -> Self {
        Self {
            action: CommandAction::Subscribe,
            topic,
        }
    }

    /// Build an unsubscribe command.
    #[must_use]
    pub const fn unsubscribe(topic: Topic) -> Self {
        Self {
            action: CommandAction::Unsubscribe,
            topic,
        }
    }
}

/// Inbound shape before the topic location is resolved.
///
/// Older dashboards nest the topic as `{ "action", "data": { "type" } }`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawCommand {
    pub action: CommandAction,
    #[serde(rename = "type")]
    pub topic: Option<String>,
    pub data: Option<RawCommandData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCommandData {
    #[serde(rename = "type")]
    pub topic: Option<String>,
}

impl RawCommand {
    /// Topic name, preferring the top-level field over the nested one.
    pub fn topic_name(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|d| d.topic.as_deref()))
    }
}

//! Server-to-client envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// Wire-level wrapper `{type, data, timestamp}` around a topic payload.
///
/// Immutable once sent. `kind` is serialized as `type` and decides which
/// sessions receive the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    /// Routing topic.
    #[serde(rename = "type")]
    pub kind: Topic,
    /// Topic-specific payload.
    pub data: T,
    /// Creation time, ISO 8601 in UTC.
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    /// Wrap `data` for `kind`, stamped with the current time.
    #[must_use]
    pub fn new(kind: Topic, data: T) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Wrap `data` with an explicit timestamp.
    #[must_use]
    pub const fn with_timestamp(kind: Topic, data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            data,
            timestamp,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Convert a typed envelope into its untyped JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn into_value(self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            kind: self.kind,
            data: serde_json::to_value(self.data)?,
            timestamp: self.timestamp,
        })
    }
}

impl Envelope {
    /// Decode the untyped payload into a concrete payload type.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not match the shape of `T`.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

//! Frame Codec
//!
//! JSON encoding and decoding for the dashboard channel. Both sides treat a
//! decode failure as a dropped frame, so errors carry enough context to log.

use serde::Serialize;

use crate::command::{ClientCommand, RawCommand};
use crate::envelope::Envelope;
use crate::topic::{Topic, UnknownTopic};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Topic name is not recognised.
    #[error(transparent)]
    UnknownTopic(#[from] UnknownTopic),

    /// Command carries no topic.
    #[error("command is missing a topic")]
    MissingTopic,

    /// Frame is not a JSON object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for client commands and server envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a client command frame.
    ///
    /// Accepts `{action, type}` and the nested `{action, data: {type}}` form.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, the action is
    /// unknown, or the topic is missing or unknown.
    pub fn decode_command(&self, text: &str) -> Result<ClientCommand, CodecError> {
        let trimmed = Self::object_frame(text)?;
        let raw: RawCommand = serde_json::from_str(trimmed)?;
        let topic: Topic = raw.topic_name().ok_or(CodecError::MissingTopic)?.parse()?;
        Ok(ClientCommand {
            action: raw.action,
            topic,
        })
    }

    /// Decode a server envelope frame with an untyped payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid envelope.
    pub fn decode_envelope(&self, text: &str) -> Result<Envelope, CodecError> {
        let trimmed = Self::object_frame(text)?;
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encode a value to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    fn object_frame(text: &str) -> Result<&str, CodecError> {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            Ok(trimmed)
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )))
        }
    }
}

//! Dashboard API Port (Driven Port)
//!
//! The HTTP endpoints offline actions are delivered to:
//!
//! - `GET` profile: `{ "user": { "preferences": { "watchlist": [...], ... } } }`
//! - `PUT` preferences: `{ "preferences": { ... } }`, full replace
//! - `POST` newsletter: `{ "email", "preferences", "source" }`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::offline::HttpMethod;

// =============================================================================
// Types
// =============================================================================

/// Profile endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    /// The signed-in user.
    pub user: UserProfile,
}

/// The signed-in user's profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stored preferences.
    #[serde(default)]
    pub preferences: Preferences,
}

/// User preferences. Keys other than `watchlist` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Watched ticker symbols.
    #[serde(default)]
    pub watchlist: Vec<String>,
    /// Every other preference key.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Preferences {
    /// Whether `symbol` is on the watchlist.
    #[must_use]
    pub fn watches(&self, symbol: &str) -> bool {
        self.watchlist.iter().any(|s| s == symbol)
    }
}

/// Newsletter subscribe body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterRequest {
    /// Subscriber email.
    pub email: String,
    /// Newsletter preferences.
    pub preferences: Value,
    /// Page or widget the subscription came from.
    pub source: String,
}

/// Dashboard API errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not what the endpoint promises.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The queued action itself is invalid and was never sent.
    #[error("invalid action: {0}")]
    InvalidAction(String),
}

impl ApiError {
    /// HTTP status, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) | Self::InvalidAction(_) => None,
        }
    }
}

// =============================================================================
// Port
// =============================================================================

/// Dashboard HTTP API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Fetch the current profile and preferences.
    async fn fetch_profile(&self) -> Result<ProfileResponse, ApiError>;

    /// Replace the user's preferences.
    async fn update_preferences(&self, preferences: &Preferences) -> Result<(), ApiError>;

    /// Subscribe to the newsletter.
    async fn subscribe_newsletter(&self, request: &NewsletterRequest) -> Result<(), ApiError>;

    /// Send an arbitrary request relative to the API base URL.
    async fn send_raw(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;
}

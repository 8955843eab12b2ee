//! Offline Actions
//!
//! User mutations queued while the dashboard may be offline, and the status
//! line the dashboard renders from the queue.
//!
//! # Action Lifecycle
//!
//! ```text
//! pending ──success──► completed ──sweep──► (deleted)
//!    │  ▲
//!    │  └─ failure, retry_count < cap
//!    └──── failure at cap, or permanent rejection ──► failed (terminal)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Identifiers and Routes
// =============================================================================

/// Auto-incremented action identifier, assigned by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// HTTP method an action is delivered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferences endpoint used by watchlist and preference actions.
pub const PREFERENCES_ENDPOINT: &str = "/api/user/preferences";

/// Newsletter subscription endpoint.
pub const NEWSLETTER_ENDPOINT: &str = "/api/newsletter/subscribe";

// =============================================================================
// Actions
// =============================================================================

/// A user mutation, tagged by `type` with its `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OfflineAction {
    /// Add a symbol to the watchlist.
    WatchlistAdd {
        /// Ticker symbol.
        symbol: String,
    },
    /// Remove a symbol from the watchlist.
    WatchlistRemove {
        /// Ticker symbol.
        symbol: String,
    },
    /// Merge keys into the user's preferences.
    PreferencesUpdate {
        /// Keys to overwrite.
        preferences: Map<String, Value>,
    },
    /// Subscribe an address to the newsletter.
    NewsletterSubscribe {
        /// Subscriber email.
        email: String,
        /// Newsletter preferences.
        #[serde(default)]
        preferences: Value,
        /// Page or widget the subscription came from.
        source: String,
    },
    /// Opaque body sent as-is to the action's own endpoint.
    Custom {
        /// Request body.
        body: Value,
    },
}

impl OfflineAction {
    /// Wire name of the action type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WatchlistAdd { .. } => "watchlist_add",
            Self::WatchlistRemove { .. } => "watchlist_remove",
            Self::PreferencesUpdate { .. } => "preferences_update",
            Self::NewsletterSubscribe { .. } => "newsletter_subscribe",
            Self::Custom { .. } => "custom",
        }
    }
}

/// An action plus the route it is delivered to.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// The mutation.
    pub action: OfflineAction,
    /// Endpoint path, relative to the API base URL.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
}

impl ActionRequest {
    /// A custom action delivered to `endpoint` with `method`.
    #[must_use]
    pub fn custom(method: HttpMethod, endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            action: OfflineAction::Custom { body },
            endpoint: endpoint.into(),
            method,
        }
    }
}

impl From<OfflineAction> for ActionRequest {
    fn from(action: OfflineAction) -> Self {
        let (method, endpoint) = match &action {
            OfflineAction::NewsletterSubscribe { .. } => (HttpMethod::Post, NEWSLETTER_ENDPOINT),
            _ => (HttpMethod::Put, PREFERENCES_ENDPOINT),
        };
        Self {
            action,
            endpoint: endpoint.to_string(),
            method,
        }
    }
}

/// Delivery status of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Awaiting delivery.
    Pending,
    /// Delivered; removed by the next sweep.
    Completed,
    /// Terminal. Needs manual intervention.
    Failed,
}

/// A durable queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    /// Store-assigned id. Enqueue order.
    pub id: ActionId,
    /// The mutation.
    pub action: OfflineAction,
    /// Endpoint path.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// When the action was enqueued.
    pub timestamp: DateTime<Utc>,
    /// Delivery status.
    pub status: ActionStatus,
    /// Failed delivery attempts.
    pub retry_count: u32,
    /// Most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// A new pending entry.
    #[must_use]
    pub fn new(id: ActionId, request: ActionRequest) -> Self {
        Self {
            id,
            action: request.action,
            endpoint: request.endpoint,
            method: request.method,
            timestamp: Utc::now(),
            status: ActionStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Whether the action is awaiting delivery.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }
}

// =============================================================================
// Dashboard Status
// =============================================================================

/// Connectivity and queue status rendered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardStatus {
    /// No connection; actions wait in the queue.
    Offline {
        /// Pending actions.
        queued: usize,
    },
    /// A sync pass is running.
    Syncing {
        /// Pending actions at the last update.
        queued: usize,
    },
    /// Online with an empty queue.
    Synced,
    /// Online with actions still pending (retry scheduled for the next pass).
    Pending {
        /// Pending actions.
        queued: usize,
    },
}

impl DashboardStatus {
    /// Derive the status from connectivity, queue length and the in-flight flag.
    #[must_use]
    pub const fn derive(online: bool, queued: usize, syncing: bool) -> Self {
        if syncing {
            Self::Syncing { queued }
        } else if !online {
            Self::Offline { queued }
        } else if queued == 0 {
            Self::Synced
        } else {
            Self::Pending { queued }
        }
    }
}

impl fmt::Display for DashboardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline { queued: 1 } => f.write_str("offline, 1 action queued"),
            Self::Offline { queued } => write!(f, "offline, {queued} actions queued"),
            Self::Syncing { .. } => f.write_str("syncing now"),
            Self::Synced => f.write_str("online, synced"),
            Self::Pending { queued: 1 } => f.write_str("online, 1 action pending"),
            Self::Pending { queued } => write!(f, "online, {queued} actions pending"),
        }
    }
}

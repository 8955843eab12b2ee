//! Persistent Store
//!
//! Durable storage for the offline action queue and small preference blobs,
//! plus a process-local snapshot cache.
//!
//! # Storage
//!
//! Queue and preferences live in ordered in-memory maps that are written to
//! a JSON file after every mutation (temp file, then rename). Without a path
//! the store is memory only.
//!
//! The file is loaded lazily by the first operation. A file that cannot be
//! read or parsed leaves the store unavailable: reads return empty results,
//! writes return `StoreError::Unavailable`, and the file is left as it was.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use crate::domain::offline::{ActionId, ActionRequest, ActionStatus, QueuedAction};

// =============================================================================
// Errors
// =============================================================================

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file could not be loaded; the store is read-empty.
    #[error("store unavailable")]
    Unavailable,

    /// Writing the snapshot failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be serialized.
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// Snapshot
// =============================================================================

/// On-disk contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    next_id: u64,
    /// Ascending by id, which is enqueue order.
    #[serde(default)]
    actions: Vec<QueuedAction>,
    #[serde(default)]
    preferences: BTreeMap<String, Value>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            next_id: 1,
            actions: Vec::new(),
            preferences: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    fn find_mut(&mut self, id: ActionId) -> Option<&mut QueuedAction> {
        self.actions.iter_mut().find(|action| action.id == id)
    }
}

#[derive(Debug)]
struct StoreState {
    available: bool,
    snapshot: Snapshot,
}

/// A cached value and when it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// Cached value.
    pub data: Value,
    /// When the value was written.
    pub timestamp: Instant,
    /// Hard expiry, if one was set.
    pub expires: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        let within_age = now.saturating_duration_since(self.timestamp) <= max_age;
        let before_expiry = self.expires.is_none_or(|expires| now < expires);
        within_age && before_expiry
    }
}

// =============================================================================
// Store
// =============================================================================

/// Durable keyed storage for the offline queue.
#[derive(Debug)]
pub struct PersistentStore {
    path: Option<PathBuf>,
    state: OnceCell<Mutex<StoreState>>,
    cache: SyncMutex<HashMap<String, CacheEntry>>,
}

impl PersistentStore {
    /// A store backed by the JSON file at `path`. Nothing is read until first use.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: OnceCell::new(),
            cache: SyncMutex::new(HashMap::new()),
        }
    }

    /// A store that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: OnceCell::new(),
            cache: SyncMutex::new(HashMap::new()),
        }
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the store loaded successfully. Waits for initialization.
    pub async fn is_available(&self) -> bool {
        self.state().await.lock().await.available
    }

    // -------------------------------------------------------------------------
    // Queue
    // -------------------------------------------------------------------------

    /// Append a pending action and return its id once it is written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn enqueue(&self, request: impl Into<ActionRequest>) -> Result<ActionId, StoreError> {
        let request = request.into();
        let id = self
            .mutate(|snapshot| {
                let id = ActionId(snapshot.next_id);
                snapshot.next_id += 1;
                snapshot.actions.push(QueuedAction::new(id, request));
                id
            })
            .await?;
        tracing::debug!(action_id = %id, "Action enqueued");
        Ok(id)
    }

    /// Pending actions in enqueue order.
    pub async fn list_pending(&self) -> Vec<QueuedAction> {
        self.read(|snapshot| {
            snapshot
                .actions
                .iter()
                .filter(|action| action.is_pending())
                .cloned()
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    /// Actions that reached the terminal `failed` status, in enqueue order.
    pub async fn list_failed(&self) -> Vec<QueuedAction> {
        self.read(|snapshot| {
            snapshot
                .actions
                .iter()
                .filter(|action| action.status == ActionStatus::Failed)
                .cloned()
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    /// Number of pending actions.
    pub async fn pending_count(&self) -> usize {
        self.read(|snapshot| snapshot.actions.iter().filter(|a| a.is_pending()).count())
            .await
            .unwrap_or(0)
    }

    /// Look up one action.
    pub async fn get(&self, id: ActionId) -> Option<QueuedAction> {
        self.read(|snapshot| snapshot.actions.iter().find(|a| a.id == id).cloned())
            .await
            .flatten()
    }

    /// Mark a pending action delivered. Unknown or already-completed ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn mark_completed(&self, id: ActionId) -> Result<(), StoreError> {
        self.mutate(|snapshot| {
            if let Some(action) = snapshot.find_mut(id)
                && action.is_pending()
            {
                action.status = ActionStatus::Completed;
                action.last_error = None;
            }
        })
        .await
    }

    /// Count a failed delivery of a pending action.
    ///
    /// The action turns `failed` once its retry count reaches `cap`. Returns
    /// the resulting status, or `None` if the action is unknown or not pending.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn record_failure(
        &self,
        id: ActionId,
        cap: u32,
        reason: &str,
    ) -> Result<Option<ActionStatus>, StoreError> {
        self.mutate(|snapshot| {
            let action = snapshot.find_mut(id).filter(|a| a.is_pending())?;
            action.retry_count += 1;
            action.last_error = Some(reason.to_string());
            if action.retry_count >= cap {
                action.status = ActionStatus::Failed;
            }
            Some(action.status)
        })
        .await
    }

    /// Move a pending action straight to `failed`. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn mark_failed(&self, id: ActionId, reason: &str) -> Result<bool, StoreError> {
        self.mutate(|snapshot| {
            let Some(action) = snapshot.find_mut(id).filter(|a| a.is_pending()) else {
                return false;
            };
            action.retry_count += 1;
            action.status = ActionStatus::Failed;
            action.last_error = Some(reason.to_string());
            true
        })
        .await
    }

    /// Return a failed action to the queue with a fresh retry count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn retry_failed(&self, id: ActionId) -> Result<bool, StoreError> {
        self.mutate(|snapshot| {
            let Some(action) = snapshot
                .find_mut(id)
                .filter(|a| a.status == ActionStatus::Failed)
            else {
                return false;
            };
            action.status = ActionStatus::Pending;
            action.retry_count = 0;
            action.last_error = None;
            true
        })
        .await
    }

    /// Delete an action regardless of status. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn remove(&self, id: ActionId) -> Result<bool, StoreError> {
        self.mutate(|snapshot| {
            let before = snapshot.actions.len();
            snapshot.actions.retain(|a| a.id != id);
            snapshot.actions.len() != before
        })
        .await
    }

    /// Delete every completed action. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn sweep_completed(&self) -> Result<usize, StoreError> {
        self.mutate(|snapshot| {
            let before = snapshot.actions.len();
            snapshot
                .actions
                .retain(|a| a.status != ActionStatus::Completed);
            before - snapshot.actions.len()
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Preferences
    // -------------------------------------------------------------------------

    /// A stored preference blob.
    pub async fn get_preference(&self, key: &str) -> Option<Value> {
        self.read(|snapshot| snapshot.preferences.get(key).cloned())
            .await
            .flatten()
    }

    /// Store a preference blob.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or the write fails.
    pub async fn set_preference(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.mutate(|snapshot| {
            snapshot.preferences.insert(key.to_string(), value);
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Snapshot cache
    // -------------------------------------------------------------------------

    /// Cached data for `key` if it was written at most `max_age` ago.
    ///
    /// Expired and absent entries both return `None`.
    #[must_use]
    pub fn get_cached(&self, key: &str, max_age: Duration) -> Option<Value> {
        let now = Instant::now();
        self.cache
            .lock()
            .get(key)
            .filter(|entry| entry.is_fresh(now, max_age))
            .map(|entry| entry.data.clone())
    }

    /// Upsert cached data stamped with the current time.
    pub fn set_cached(&self, key: &str, data: Value) {
        self.insert_cached(key, data, None);
    }

    /// Upsert cached data that also expires after `ttl`.
    pub fn set_cached_with_ttl(&self, key: &str, data: Value, ttl: Duration) {
        self.insert_cached(key, data, Some(ttl));
    }

    /// Drop entries past their hard expiry. Returns how many were dropped.
    pub fn prune_expired_cache(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| entry.expires.is_none_or(|expires| now < expires));
        before - cache.len()
    }

    fn insert_cached(&self, key: &str, data: Value, ttl: Option<Duration>) {
        let timestamp = Instant::now();
        let entry = CacheEntry {
            key: key.to_string(),
            data,
            timestamp,
            expires: ttl.map(|ttl| timestamp + ttl),
        };
        self.cache.lock().insert(key.to_string(), entry);
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn state(&self) -> &Mutex<StoreState> {
        self.state
            .get_or_init(|| async { Mutex::new(self.load().await) })
            .await
    }

    async fn load(&self) -> StoreState {
        let Some(path) = &self.path else {
            return StoreState {
                available: true,
                snapshot: Snapshot::default(),
            };
        };

        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No store file yet, starting empty");
                return StoreState {
                    available: true,
                    snapshot: Snapshot::default(),
                };
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read store file");
                return StoreState {
                    available: false,
                    snapshot: Snapshot::default(),
                };
            }
        };

        match serde_json::from_slice::<Snapshot>(&contents) {
            Ok(snapshot) => {
                tracing::info!(
                    path = %path.display(),
                    actions = snapshot.actions.len(),
                    "Loaded store"
                );
                StoreState {
                    available: true,
                    snapshot,
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Store file is corrupt");
                StoreState {
                    available: false,
                    snapshot: Snapshot::default(),
                }
            }
        }
    }

    async fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Option<T> {
        let state = self.state().await.lock().await;
        state.available.then(|| f(&state.snapshot))
    }

    /// Apply `f` to a copy of the snapshot and persist it if anything changed.
    /// The in-memory snapshot is only replaced after a successful write.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> Result<T, StoreError> {
        let mut state = self.state().await.lock().await;
        if !state.available {
            return Err(StoreError::Unavailable);
        }

        let mut next = state.snapshot.clone();
        let result = f(&mut next);
        if next != state.snapshot {
            if let Some(path) = &self.path {
                persist(path, &next).await?;
            }
            state.snapshot = next;
        }
        Ok(result)
    }
}

async fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let contents = serde_json::to_vec_pretty(snapshot)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

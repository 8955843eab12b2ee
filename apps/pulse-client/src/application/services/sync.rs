//! Offline Queue Sync
//!
//! Drains the durable action queue against the dashboard API.
//!
//! # Pass
//!
//! 1. Take the in-flight guard; if another pass holds it, return `Skipped`
//! 2. Read pending actions, oldest first
//! 3. Deliver each one and await it before starting the next
//! 4. Success marks the action completed; failure counts a retry, and the
//!    action turns `failed` once it reaches the retry cap
//! 5. Sweep completed actions (errors are logged and retried next pass)
//! 6. Release the guard
//!
//! Passes are triggered manually with `sync()`, and by `run()` on startup
//! when already connected and on every transition into `connected`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::handlers;
use crate::application::ports::{ApiError, DashboardApi};
use crate::domain::connection::ConnectionState;
use crate::domain::offline::{ActionId, ActionRequest, ActionStatus, DashboardStatus, QueuedAction};
use crate::infrastructure::store::{PersistentStore, StoreError};

// =============================================================================
// Configuration and Results
// =============================================================================

/// Sync configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Failed deliveries before an action becomes terminal.
    pub retry_cap: u32,
    /// Treat 4xx responses (except 408 and 429) as permanent failures.
    pub classify_client_errors: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_cap: 3,
            classify_client_errors: true,
        }
    }
}

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Deliveries started.
    pub attempted: usize,
    /// Actions marked completed.
    pub completed: usize,
    /// Actions left pending for the next pass.
    pub retried: usize,
    /// Actions that became terminal.
    pub failed: usize,
    /// Completed actions deleted by the sweep.
    pub swept: usize,
    /// The pass stopped early because of shutdown.
    pub cancelled: bool,
}

/// Result of a sync trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another pass was already running.
    Skipped,
    /// A pass ran.
    Completed(SyncReport),
}

/// How a delivery failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureCategory {
    /// Count a retry.
    Retryable,
    /// Fail the action now.
    Permanent,
}

const fn categorize(error: &ApiError, classify_client_errors: bool) -> FailureCategory {
    if matches!(error, ApiError::InvalidAction(_)) {
        return FailureCategory::Permanent;
    }
    match error.status() {
        Some(408 | 429) => FailureCategory::Retryable,
        Some(400..=499) if classify_client_errors => FailureCategory::Permanent,
        _ => FailureCategory::Retryable,
    }
}

// =============================================================================
// Service
// =============================================================================

/// Shared handle to the offline queue sync.
#[derive(Clone)]
pub struct OfflineQueueSync {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<PersistentStore>,
    api: Arc<dyn DashboardApi>,
    config: SyncConfig,
    in_flight: AtomicBool,
    online: AtomicBool,
    cancel: CancellationToken,
    status_tx: watch::Sender<DashboardStatus>,
}

/// Holds the in-flight flag; released on drop.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OfflineQueueSync {
    /// Create the sync service. Nothing runs until `sync()` or `run()`.
    #[must_use]
    pub fn new(store: Arc<PersistentStore>, api: Arc<dyn DashboardApi>, config: SyncConfig) -> Self {
        let (status_tx, _) = watch::channel(DashboardStatus::derive(false, 0, false));
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                config,
                in_flight: AtomicBool::new(false),
                online: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                status_tx,
            }),
        }
    }

    /// Run one pass unless one is already in flight.
    pub async fn sync(&self) -> SyncOutcome {
        let Some(guard) = InFlightGuard::acquire(&self.inner.in_flight) else {
            tracing::debug!("Sync already in progress, skipping");
            return SyncOutcome::Skipped;
        };

        self.inner.refresh_status().await;
        let report = self.inner.run_pass().await;
        drop(guard);
        self.inner.refresh_status().await;

        tracing::info!(
            attempted = report.attempted,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            swept = report.swept,
            cancelled = report.cancelled,
            "Sync pass finished"
        );
        SyncOutcome::Completed(report)
    }

    /// Trigger passes from connection state: once at startup if already
    /// connected, then on every transition into `connected`.
    ///
    /// Returns when the state sender is dropped or after `shutdown()`.
    pub async fn run(&self, mut state_rx: watch::Receiver<ConnectionState>) {
        let mut online = state_rx.borrow_and_update().is_connected();
        self.set_online(online).await;
        if online {
            self.sync().await;
        }

        loop {
            tokio::select! {
                () = self.inner.cancel.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let now_online = state_rx.borrow_and_update().is_connected();
            if now_online == online {
                continue;
            }
            online = now_online;
            self.set_online(online).await;
            if online {
                tracing::info!("Connection restored, syncing offline actions");
                self.sync().await;
            }
        }
        tracing::debug!("Sync loop stopped");
    }

    /// Queue an action for delivery.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the action could not be written.
    pub async fn enqueue(&self, request: impl Into<ActionRequest>) -> Result<ActionId, StoreError> {
        let id = self.inner.store.enqueue(request).await?;
        self.inner.refresh_status().await;
        Ok(id)
    }

    /// Return a terminal action to the queue for another round of retries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store could not be updated.
    pub async fn retry_failed(&self, id: ActionId) -> Result<bool, StoreError> {
        let reset = self.inner.store.retry_failed(id).await?;
        self.inner.refresh_status().await;
        Ok(reset)
    }

    /// Record connectivity for the status line.
    pub async fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::Release);
        self.inner.refresh_status().await;
    }

    /// Current status, recomputed from the queue.
    pub async fn status(&self) -> DashboardStatus {
        self.inner.refresh_status().await
    }

    /// Observe status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<DashboardStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Whether a pass is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Stop `run()` and abandon the in-flight delivery. The abandoned action
    /// stays pending without counting a retry.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    async fn run_pass(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for action in self.store.list_pending().await {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.attempted += 1;

            let result = tokio::select! {
                () = self.cancel.cancelled() => None,
                result = handlers::deliver(self.api.as_ref(), &action) => Some(result),
            };
            let Some(result) = result else {
                tracing::info!(action_id = %action.id, "Sync cancelled, action left pending");
                report.cancelled = true;
                break;
            };

            match result {
                Ok(()) => self.on_delivered(&action, &mut report).await,
                Err(e) => self.on_failed(&action, &e, &mut report).await,
            }
        }

        match self.store.sweep_completed().await {
            Ok(swept) => report.swept = swept,
            Err(e) => tracing::warn!(error = %e, "Failed to sweep completed actions"),
        }
        report
    }

    async fn on_delivered(&self, action: &QueuedAction, report: &mut SyncReport) {
        match self.store.mark_completed(action.id).await {
            Ok(()) => {
                report.completed += 1;
                tracing::debug!(action_id = %action.id, kind = action.action.kind(), "Action delivered");
            }
            Err(e) => {
                tracing::error!(action_id = %action.id, error = %e, "Failed to mark action completed");
            }
        }
    }

    async fn on_failed(&self, action: &QueuedAction, error: &ApiError, report: &mut SyncReport) {
        let reason = error.to_string();
        let result = match categorize(error, self.config.classify_client_errors) {
            FailureCategory::Permanent => self
                .store
                .mark_failed(action.id, &reason)
                .await
                .map(|changed| changed.then_some(ActionStatus::Failed)),
            FailureCategory::Retryable => {
                self.store
                    .record_failure(action.id, self.config.retry_cap, &reason)
                    .await
            }
        };

        match result {
            Ok(Some(ActionStatus::Failed)) => {
                report.failed += 1;
                tracing::warn!(
                    action_id = %action.id,
                    kind = action.action.kind(),
                    error = %error,
                    "Action failed permanently"
                );
            }
            Ok(Some(_)) => {
                report.retried += 1;
                tracing::warn!(
                    action_id = %action.id,
                    kind = action.action.kind(),
                    attempt = action.retry_count + 1,
                    error = %error,
                    "Action delivery failed, will retry"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(action_id = %action.id, error = %e, "Failed to record delivery failure");
            }
        }
    }

    async fn refresh_status(&self) -> DashboardStatus {
        let status = DashboardStatus::derive(
            self.online.load(Ordering::Acquire),
            self.store.pending_count().await,
            self.in_flight.load(Ordering::Acquire),
        );
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        status
    }
}

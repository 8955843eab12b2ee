//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Sessions**: Open WebSocket sessions and per-topic subscribers
//! - **Fan-out**: Envelopes broadcast, frames delivered, delivery failures
//! - **Input**: Client commands applied and malformed frames dropped
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the server port. Recording functions
//! are no-ops until `init_metrics` installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use pulse_protocol::{CommandAction, Topic};

use crate::application::ports::DeliveryError;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus recorder could not be installed.
    #[error("failed to install Prometheus recorder: {0}")]
    Install(#[from] BuildError),
}

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again after a successful install returns the existing handle.
///
/// # Errors
///
/// Returns `MetricsError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_gauge!("pulse_server_sessions", "Number of open WebSocket sessions");
    describe_gauge!(
        "pulse_server_topic_subscribers",
        "Sessions subscribed to each topic"
    );

    describe_counter!(
        "pulse_server_envelopes_broadcast_total",
        "Envelopes broadcast by topic"
    );
    describe_counter!(
        "pulse_server_frames_delivered_total",
        "Frames queued for sessions by topic"
    );
    describe_counter!(
        "pulse_server_delivery_failures_total",
        "Per-session delivery failures by topic and reason"
    );
    describe_histogram!(
        "pulse_server_broadcast_recipients",
        "Sessions matched per broadcast"
    );

    describe_counter!(
        "pulse_server_commands_total",
        "Subscription commands applied by action"
    );
    describe_counter!(
        "pulse_server_malformed_frames_total",
        "Client frames dropped because they could not be decoded"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Update the open session count.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions(count: usize) {
    gauge!("pulse_server_sessions").set(count as f64);
}

/// Update the subscriber count for a topic.
#[allow(clippy::cast_precision_loss)]
pub fn set_topic_subscribers(topic: Topic, count: usize) {
    gauge!("pulse_server_topic_subscribers", "topic" => topic.as_str()).set(count as f64);
}

/// Record one broadcast and its fan-out.
#[allow(clippy::cast_precision_loss)]
pub fn record_broadcast(topic: Topic, recipients: usize, delivered: usize) {
    counter!("pulse_server_envelopes_broadcast_total", "topic" => topic.as_str()).increment(1);
    counter!("pulse_server_frames_delivered_total", "topic" => topic.as_str())
        .increment(delivered as u64);
    histogram!("pulse_server_broadcast_recipients", "topic" => topic.as_str())
        .record(recipients as f64);
}

/// Record a failed delivery to one session.
pub fn record_delivery_failure(topic: Topic, error: DeliveryError) {
    counter!(
        "pulse_server_delivery_failures_total",
        "topic" => topic.as_str(),
        "reason" => error.as_str()
    )
    .increment(1);
}

/// Record an applied subscription command.
pub fn record_command(action: CommandAction) {
    counter!("pulse_server_commands_total", "action" => action.as_str()).increment(1);
}

/// Record a dropped client frame.
pub fn record_malformed_frame() {
    counter!("pulse_server_malformed_frames_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

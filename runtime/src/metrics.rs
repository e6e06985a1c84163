//! Prometheus metrics for observability.
//!
//! Store and bus components record through the `metrics` facade. Installing a
//! [`MetricsRecorder`] routes those records into a Prometheus registry whose
//! text exposition can be rendered on demand (the host app decides where to
//! ship it).
//!
//! # Example
//!
//! ```rust,no_run
//! use promptbus_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! // ... run the bus ...
//! if let Some(snapshot) = recorder.render() {
//!     println!("{snapshot}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsRecorder {
    /// Register metric descriptions and install the global Prometheus recorder.
    ///
    /// If a recorder is already installed (e.g. several hubs in one test
    /// binary), the returned recorder has no handle and [`render`](Self::render)
    /// returns `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this recorder did not install the global recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store Metrics
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_counter!("store.effects.executed", "Effects executed, labelled by type");
    describe_counter!("store.effects.cancelled", "In-flight effects aborted through cancellation");
    describe_histogram!("store.reducer.duration_seconds", "Time taken to run a reducer");

    // Request Bus Metrics
    describe_counter!("bus.messages.emitted", "Messages published on the request bus");
    describe_counter!("bus.messages.delivered", "Messages delivered to subscribers");

    // Arbiter Metrics
    describe_counter!("arbiter.requests.total", "Capability requests received");
    describe_counter!("arbiter.requests.auto_granted", "Requests resolved without UI (access already granted or rating gate closed)");
    describe_counter!("arbiter.requests.superseded", "Unresolved requests discarded by a newer request");
    describe_counter!("arbiter.requests.granted", "Requests resolved through on_granted");
    describe_counter!("arbiter.requests.dismissed", "Requests resolved through on_dismiss");

    // Notification Metrics
    describe_counter!("notifications.emitted", "Notifications received by the queue");
    describe_counter!("notifications.deduplicated", "Notifications suppressed as duplicates of the head");
    describe_counter!("notifications.evicted", "Notifications evicted at capacity");
    describe_counter!("notifications.expired", "Notifications removed by their auto-dismiss timer");
}

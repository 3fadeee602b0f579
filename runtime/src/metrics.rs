//! Prometheus metrics for observability and monitoring.
//!
//! The Store records:
//! - Actions reduced, and how long each reducer pass took
//! - Effects started, failed and cancelled
//! - State subscribers that fell behind the broadcast buffer
//!
//! Recording is always on and costs nothing until a recorder is installed;
//! [`MetricsServer`] installs the Prometheus one.
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_store_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Total actions reduced, labelled by store name.
pub const ACTIONS_TOTAL: &str = "store.actions.total";
/// Reducer pass latency, labelled by store name.
pub const REDUCER_DURATION: &str = "store.reducer.duration_seconds";
/// Effects started, labelled by store name.
pub const EFFECTS_EXECUTED: &str = "store.effects.executed";
/// Effects that ended with an error or a panic, labelled by store name.
pub const EFFECTS_FAILED: &str = "store.effects.failed";
/// Effect tasks cancelled through their id, labelled by store name.
pub const EFFECTS_CANCELLED: &str = "store.effects.cancelled";
/// Snapshots skipped by slow state subscribers, labelled by store name.
pub const SUBSCRIBER_LAGGED: &str = "store.subscribers.lagged";

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

/// Prometheus metrics exporter.
///
/// Installs the global recorder and renders the scrape text on demand. The address
/// is where the embedding application serves that text.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address metrics are published on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address metrics are published on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder that is already installed (e.g., by an earlier test) is left in
    /// place; this server then has no handle and [`render`](Self::render) returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
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

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for every metric the Store records.
///
/// Safe to call more than once.
pub fn register_metrics() {
    describe_counter!(ACTIONS_TOTAL, "Total number of actions reduced by stores");
    describe_histogram!(
        REDUCER_DURATION,
        metrics::Unit::Seconds,
        "Time taken by one reducer pass"
    );
    describe_counter!(EFFECTS_EXECUTED, "Total number of effects started");
    describe_counter!(
        EFFECTS_FAILED,
        "Total number of effects that ended with an error or a panic"
    );
    describe_counter!(
        EFFECTS_CANCELLED,
        "Total number of effect tasks cancelled by id"
    );
    describe_counter!(
        SUBSCRIBER_LAGGED,
        "Total number of state snapshots skipped by slow subscribers"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record one reducer pass.
    pub fn record_action(store: &str, duration: Duration) {
        counter!(ACTIONS_TOTAL, "store" => store.to_string()).increment(1);
        histogram!(REDUCER_DURATION, "store" => store.to_string()).record(duration.as_secs_f64());
    }

    /// Record an effect being started.
    pub fn record_effect_started(store: &str) {
        counter!(EFFECTS_EXECUTED, "store" => store.to_string()).increment(1);
    }

    /// Record an effect failure or panic.
    pub fn record_effect_failed(store: &str) {
        counter!(EFFECTS_FAILED, "store" => store.to_string()).increment(1);
    }

    /// Record cancelled effect tasks.
    pub fn record_cancelled(store: &str, count: usize) {
        counter!(EFFECTS_CANCELLED, "store" => store.to_string())
            .increment(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Record snapshots a subscriber skipped.
    pub fn record_lagged(store: &str, skipped: u64) {
        counter!(SUBSCRIBER_LAGGED, "store" => store.to_string()).increment(skipped);
    }
}

//! Metrics facade for the storage engine and services.
//!
//! Built on the `metrics` crate so instrumentation is backend-agnostic; the
//! Prometheus exporter only exists behind the `metrics-exporter` feature.
//! Naming convention: `weir_{component}_{name}_{unit}`.

use std::time::Instant;

#[cfg(feature = "metrics-exporter")]
use std::sync::OnceLock;

#[cfg(feature = "metrics-exporter")]
static EXPORTER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus exporter serving `/metrics` on `addr`. Safe to call
/// more than once; only the first call installs.
#[cfg(feature = "metrics-exporter")]
pub fn init_exporter(addr: std::net::SocketAddr) {
    EXPORTER_INSTALLED.get_or_init(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => tracing::info!("metrics exporter listening on http://{addr}/metrics"),
            Err(e) => tracing::error!("failed to install metrics exporter: {e}"),
        }
    });
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_exporter(_addr: std::net::SocketAddr) {}

/// Wall-clock stopwatch for latency histograms.
pub struct Timer {
    start: Instant,
}

impl Timer {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Storage engine metrics.
pub struct StorageMetrics;

impl StorageMetrics {
    pub fn record_append(records: u64, bytes: u64, latency_ms: f64) {
        metrics::counter!("weir_storage_records_appended_total").increment(records);
        metrics::counter!("weir_storage_bytes_appended_total").increment(bytes);
        metrics::histogram!("weir_storage_append_latency_ms").record(latency_ms);
    }

    pub fn record_read(batches: u64, bytes: u64, latency_ms: f64) {
        metrics::counter!("weir_storage_batches_read_total").increment(batches);
        metrics::counter!("weir_storage_bytes_read_total").increment(bytes);
        metrics::histogram!("weir_storage_read_latency_ms").record(latency_ms);
    }

    pub fn record_segment_roll() {
        metrics::counter!("weir_storage_segment_rolls_total").increment(1);
    }

    pub fn record_recovery_truncation(dropped_bytes: u64) {
        metrics::counter!("weir_storage_recovery_truncations_total").increment(1);
        metrics::counter!("weir_storage_recovery_bytes_dropped_total").increment(dropped_bytes);
    }
}

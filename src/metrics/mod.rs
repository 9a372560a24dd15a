//! Prometheus metrics for the parkpulse pipeline
//!
//! This module provides metrics tracking for:
//! - Acquisition: cycles per winning source, adapter failures, cycle duration
//! - Cache: persistence failures, current snapshot record count
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct PipelineMetrics {
    acquisition_cycles: CounterVec,
    adapter_failures: CounterVec,
    cache_write_failures: Counter,
    snapshot_records: Gauge,
    acquisition_duration: HistogramVec,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = parkpulse::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let pipeline = PipelineMetrics {
        acquisition_cycles: register_counter_vec!(
            "parkpulse_acquisition_cycles_total",
            "Completed acquisition cycles by winning source",
            &["source"]
        )?,
        adapter_failures: register_counter_vec!(
            "parkpulse_adapter_failures_total",
            "Source adapter failures by adapter",
            &["adapter"]
        )?,
        cache_write_failures: register_counter!(
            "parkpulse_cache_write_failures_total",
            "Snapshot persistence failures"
        )?,
        snapshot_records: register_gauge!(
            "parkpulse_snapshot_records",
            "Number of facility records in the current snapshot bundle"
        )?,
        acquisition_duration: register_histogram_vec!(
            "parkpulse_acquisition_duration_seconds",
            "Acquisition cycle duration in seconds by winning source",
            &["source"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
    };

    PIPELINE_METRICS
        .set(pipeline)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a completed acquisition cycle
pub fn record_cycle(source: &str, records: usize, duration_secs: f64) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    m.acquisition_cycles.with_label_values(&[source]).inc();
    m.snapshot_records.set(records as f64);
    m.acquisition_duration
        .with_label_values(&[source])
        .observe(duration_secs);
}

/// Record a failed source adapter
pub fn record_adapter_failure(adapter: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.adapter_failures.with_label_values(&[adapter]).inc();
    }
}

/// Record a snapshot persistence failure
pub fn record_cache_write_failure() {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.cache_write_failures.inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

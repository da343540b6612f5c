//! Prometheus metrics for observability.
//!
//! This module provides the server-side metrics:
//! - HTTP request metrics (latency, counts, in flight)
//! - Scheduler and download queue status (collected dynamically)
//! - Source health from the circuit breaker (collected dynamically)
//!
//! Pipeline counters live in `mediarr_core::metrics` and are registered here.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

use mediarr_core::TrackedState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediarr_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediarr_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediarr_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics (collected dynamically)
// =============================================================================

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediarr_scheduler_running",
        "Whether the scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Wanted targets.
pub static WANTED_TARGETS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mediarr_wanted_targets", "Number of wanted targets").unwrap()
});

/// Tracked downloads by current state.
pub static DOWNLOADS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "mediarr_downloads_by_state",
            "Non-terminal tracked downloads by state",
        ),
        &["state"],
    )
    .unwrap()
});

/// Sources currently disabled by the circuit breaker.
pub static SOURCE_DISABLED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "mediarr_source_disabled",
            "Whether a source is disabled by its circuit breaker (1) or not (0)",
        ),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Scheduler
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(WANTED_TARGETS.clone())).unwrap();
    registry
        .register(Box::new(DOWNLOADS_BY_STATE.clone()))
        .unwrap();
    registry
        .register(Box::new(SOURCE_DISABLED.clone()))
        .unwrap();

    // Core metrics (search, decisions, downloads, imports)
    for metric in mediarr_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the scheduler, the download
/// queue and source health at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Some(scheduler) = state.scheduler() {
        SCHEDULER_RUNNING.set(if scheduler.is_running() { 1 } else { 0 });
    }

    let Some(pipeline) = state.pipeline() else {
        return;
    };

    WANTED_TARGETS.set(pipeline.wanted().await.len() as i64);

    match pipeline.get_queue() {
        Ok(queue) => {
            for tracked_state in TrackedState::ALL {
                let count = queue.iter().filter(|d| d.state == tracked_state).count();
                DOWNLOADS_BY_STATE
                    .with_label_values(&[tracked_state.as_str()])
                    .set(count as i64);
            }
        }
        Err(e) => warn!(error = %e, "Failed to read download queue for metrics"),
    }

    let aggregator = pipeline.aggregator();
    for source in aggregator.source_names() {
        let disabled = aggregator.breaker().status(&source).disabled;
        SOURCE_DISABLED
            .with_label_values(&[source.as_str()])
            .set(if disabled { 1 } else { 0 });
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    static UUID: Lazy<regex_lite::Regex> = Lazy::new(|| {
        regex_lite::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .unwrap()
    });
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    let result = UUID.replace_all(path, "{id}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}

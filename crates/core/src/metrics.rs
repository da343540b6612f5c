//! Prometheus metrics for core components.
//!
//! Covers source searches, decisions, grabs, download lifecycle, imports and
//! the blocklist. The server registers [`all_metrics`] and exposes them on
//! `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Search
// =============================================================================

/// Aggregated searches by kind ("search", "recent").
pub static SEARCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediarr_searches_total", "Total aggregated searches"),
        &["kind"],
    )
    .unwrap()
});

/// Aggregated search duration in seconds.
pub static SEARCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "mediarr_search_duration_seconds",
            "Duration of an aggregated search across all sources",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

/// Per-source query results ("success", "failure", "timeout").
pub static SOURCE_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediarr_source_queries_total", "Queries sent to each source"),
        &["source", "result"],
    )
    .unwrap()
});

/// Circuit breaker trips by source.
pub static BREAKER_TRIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediarr_source_breaker_trips_total",
            "Times a source was disabled by the circuit breaker",
        ),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Decisions
// =============================================================================

/// Accepted releases.
pub static DECISIONS_ACCEPTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mediarr_decisions_accepted_total", "Releases accepted").unwrap()
});

/// Rejected releases by first rejection reason.
pub static DECISIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediarr_decisions_rejected_total", "Releases rejected"),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Releases handed to the download client, by protocol.
pub static GRABS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediarr_grabs_total", "Releases sent to the download client"),
        &["protocol"],
    )
    .unwrap()
});

pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediarr_downloads_completed_total",
        "Downloads reported complete by the client",
    )
    .unwrap()
});

pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mediarr_downloads_failed_total", "Downloads that failed").unwrap()
});

/// Import attempts by result ("imported", "failed").
pub static IMPORTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediarr_imports_total", "Import attempts"),
        &["result"],
    )
    .unwrap()
});

pub static BLOCKLIST_ADDITIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediarr_blocklist_additions_total",
        "Releases added to the blocklist",
    )
    .unwrap()
});

/// All core metrics, for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Search
        Box::new(SEARCHES_TOTAL.clone()),
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SOURCE_QUERIES.clone()),
        Box::new(BREAKER_TRIPS.clone()),
        // Decisions
        Box::new(DECISIONS_ACCEPTED.clone()),
        Box::new(DECISIONS_REJECTED.clone()),
        // Downloads
        Box::new(GRABS_TOTAL.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        Box::new(IMPORTS_TOTAL.clone()),
        Box::new(BLOCKLIST_ADDITIONS.clone()),
    ]
}

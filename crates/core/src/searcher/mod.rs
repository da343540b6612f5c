//! Search aggregation.
//!
//! Fans a search out to every enabled source, isolates per-source failures
//! behind a circuit breaker and merges the results into one deduplicated
//! list.

mod aggregator;
mod circuit_breaker;
mod dedup;
mod types;

pub use aggregator::SearchAggregator;
pub use circuit_breaker::{Admission, BreakerStatus, CircuitBreaker, CircuitBreakerConfig};
pub use dedup::deduplicate_releases;
pub use types::{AggregateResult, AggregatorConfig, SearchError, MAX_CONCURRENCY};

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::indexer::{IndexerError, ReleaseInfo};

/// Hard ceiling on concurrent source queries.
pub const MAX_CONCURRENCY: usize = 16;

/// Fan-out limits.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Concurrent source queries, further capped at [`MAX_CONCURRENCY`].
    pub max_concurrency: usize,
    /// Budget for one source's whole chain.
    pub source_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: MAX_CONCURRENCY,
            source_timeout: Duration::from_secs(30),
        }
    }
}

/// Merged output of one aggregated search.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    /// Parsed and deduplicated releases, in source priority order.
    pub releases: Vec<ReleaseInfo>,
    /// Per-source failures, keyed by source name.
    pub source_errors: HashMap<String, IndexerError>,
    /// Sources that were actually queried (disabled ones are skipped).
    pub sources_queried: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No enabled sources configured")]
    NoSourcesEnabled,
}

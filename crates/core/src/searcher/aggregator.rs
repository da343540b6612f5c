//! Concurrent fan-out across sources.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::circuit_breaker::{Admission, CircuitBreaker};
use super::dedup::deduplicate_releases;
use super::types::{AggregateResult, AggregatorConfig, SearchError, MAX_CONCURRENCY};
use crate::events::{Notification, NotificationHandle};
use crate::indexer::{
    CancelSignal, ChainExecutor, IndexerError, ReleaseInfo, RequestChain, SearchCriteria, Source,
};
use crate::metrics;

/// Queries every enabled source concurrently and merges the results.
///
/// Each source is isolated: its errors and timeouts are reported in
/// [`AggregateResult::source_errors`] and fed to the circuit breaker, but
/// never fail or delay the others.
pub struct SearchAggregator {
    sources: Vec<Arc<dyn Source>>,
    executor: Arc<ChainExecutor>,
    breaker: Arc<CircuitBreaker>,
    config: AggregatorConfig,
    notifications: NotificationHandle,
}

impl SearchAggregator {
    pub fn new(
        mut sources: Vec<Arc<dyn Source>>,
        executor: Arc<ChainExecutor>,
        breaker: Arc<CircuitBreaker>,
        config: AggregatorConfig,
        notifications: NotificationHandle,
    ) -> Self {
        sources.sort_by_key(|s| s.definition().priority);
        Self {
            sources,
            executor,
            breaker,
            config,
            notifications,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run every source's search chain for `criteria`.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        cancel: &CancelSignal,
    ) -> Result<AggregateResult, SearchError> {
        debug!(
            target_id = %criteria.target_id,
            terms = %criteria.terms,
            "Starting aggregated search"
        );
        self.fan_out("search", cancel, |source| source.build_search_chain(criteria))
            .await
    }

    /// Run every source's recent-releases chain.
    pub async fn search_recent(&self, cancel: &CancelSignal) -> Result<AggregateResult, SearchError> {
        self.fan_out("recent", cancel, |source| source.build_recent_chain())
            .await
    }

    async fn fan_out<F>(
        &self,
        kind: &'static str,
        cancel: &CancelSignal,
        build_chain: F,
    ) -> Result<AggregateResult, SearchError>
    where
        F: Fn(&dyn Source) -> RequestChain,
    {
        let enabled: Vec<&Arc<dyn Source>> = self
            .sources
            .iter()
            .filter(|s| s.definition().enabled)
            .collect();
        if enabled.is_empty() {
            return Err(SearchError::NoSourcesEnabled);
        }

        let admitted: Vec<(&Arc<dyn Source>, Admission)> = enabled
            .into_iter()
            .filter_map(|source| {
                let admission = self.breaker.admit(source.name());
                match admission {
                    Admission::Open { retry_in } => {
                        debug!(
                            source = source.name(),
                            retry_in_secs = retry_in.as_secs(),
                            "Skipping disabled source"
                        );
                        None
                    }
                    _ => Some((source, admission)),
                }
            })
            .collect();

        metrics::SEARCHES_TOTAL.with_label_values(&[kind]).inc();
        let started = Instant::now();

        let permits = admitted
            .len()
            .min(self.config.max_concurrency)
            .min(MAX_CONCURRENCY)
            .max(1);
        let semaphore = Semaphore::new(permits);

        let futures: Vec<_> = admitted
            .into_iter()
            .map(|(source, admission)| {
                let source = Arc::clone(source);
                let chain = build_chain(source.as_ref());
                let semaphore = &semaphore;
                async move {
                    let _permit = semaphore.acquire().await;
                    if admission == Admission::Probe {
                        debug!(source = source.name(), "Probing disabled source");
                    }
                    let result = tokio::time::timeout(
                        self.config.source_timeout,
                        self.executor.execute(source.as_ref(), &chain, cancel),
                    )
                    .await
                    .unwrap_or(Err(IndexerError::Timeout));
                    (source.name().to_string(), result)
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;

        let mut merged: Vec<ReleaseInfo> = Vec::new();
        let mut source_errors: HashMap<String, IndexerError> = HashMap::new();
        let mut sources_queried = Vec::with_capacity(results.len());

        for (name, result) in results {
            sources_queried.push(name.clone());
            match result {
                Ok(mut releases) => {
                    metrics::SOURCE_QUERIES
                        .with_label_values(&[name.as_str(), "success"])
                        .inc();
                    if !cancel.is_cancelled() {
                        self.on_success(&name).await;
                    }
                    merged.append(&mut releases);
                }
                Err(e) => {
                    let label = if e == IndexerError::Timeout {
                        "timeout"
                    } else {
                        "failure"
                    };
                    metrics::SOURCE_QUERIES
                        .with_label_values(&[name.as_str(), label])
                        .inc();
                    warn!(source = %name, error = %e, "Source search failed");
                    self.on_failure(&name).await;
                    source_errors.insert(name, e);
                }
            }
        }

        let total = merged.len();
        let releases = deduplicate_releases(
            merged
                .into_iter()
                .map(ReleaseInfo::with_parsed)
                .collect(),
        );

        metrics::SEARCH_DURATION.observe(started.elapsed().as_secs_f64());
        info!(
            kind,
            sources = sources_queried.len(),
            failed = source_errors.len(),
            raw = total,
            unique = releases.len(),
            "Aggregated search complete"
        );

        Ok(AggregateResult {
            releases,
            source_errors,
            sources_queried,
        })
    }

    async fn on_success(&self, source: &str) {
        if self.breaker.record_success(source) {
            info!(source, "Source recovered");
            self.notifications
                .emit(Notification::SourceHealthRestored {
                    source: source.to_string(),
                })
                .await;
        }
    }

    async fn on_failure(&self, source: &str) {
        if let Some(backoff) = self.breaker.record_failure(source) {
            let failures = self.breaker.status(source).consecutive_failures;
            warn!(
                source,
                consecutive_failures = failures,
                backoff_secs = backoff.as_secs(),
                "Source disabled by circuit breaker"
            );
            metrics::BREAKER_TRIPS.with_label_values(&[source]).inc();
            self.notifications
                .emit(Notification::SourceHealthDegraded {
                    source: source.to_string(),
                    consecutive_failures: failures,
                    retry_in_secs: backoff.as_secs(),
                })
                .await;
        }
    }
}

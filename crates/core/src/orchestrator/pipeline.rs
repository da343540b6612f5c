//! The operations exposed to callers: search, grab, queue management.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{OrchestratorError, WantedTarget};
use crate::blocklist::BlocklistStore;
use crate::config::ProfileStore;
use crate::decision::{Decision, DecisionEngine, EvaluationContext, HeldFile, Target};
use crate::indexer::{CancelSignal, ReleaseInfo, SearchCriteria, TargetId};
use crate::parser::normalize_title;
use crate::searcher::{SearchAggregator, SearchError};
use crate::tracked::{
    Redownloader, TrackedDownload, TrackedDownloadManager, TrackedDownloadStore, TrackedState,
};

/// Search, decide and grab for wanted targets.
pub struct Pipeline {
    aggregator: Arc<SearchAggregator>,
    engine: DecisionEngine,
    profiles: Arc<dyn ProfileStore>,
    blocklist: Arc<dyn BlocklistStore>,
    downloads: Arc<dyn TrackedDownloadStore>,
    manager: Arc<TrackedDownloadManager>,
    wanted: RwLock<HashMap<TargetId, WantedTarget>>,
    /// Serializes the check for an active download with the grab itself.
    grab_locks: Mutex<HashMap<TargetId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    /// Build the pipeline and register it as the manager's redownloader.
    pub fn new(
        aggregator: Arc<SearchAggregator>,
        engine: DecisionEngine,
        profiles: Arc<dyn ProfileStore>,
        blocklist: Arc<dyn BlocklistStore>,
        downloads: Arc<dyn TrackedDownloadStore>,
        manager: Arc<TrackedDownloadManager>,
    ) -> Arc<Self> {
        let pipeline = Arc::new(Self {
            aggregator,
            engine,
            profiles,
            blocklist,
            downloads,
            manager,
            wanted: RwLock::new(HashMap::new()),
            grab_locks: Mutex::new(HashMap::new()),
        });
        let weak: Weak<Pipeline> = Arc::downgrade(&pipeline);
        let weak: Weak<dyn Redownloader> = weak;
        pipeline.manager.set_redownloader(weak);
        pipeline
    }

    pub fn manager(&self) -> &Arc<TrackedDownloadManager> {
        &self.manager
    }

    pub fn aggregator(&self) -> &Arc<SearchAggregator> {
        &self.aggregator
    }

    // ========================================================================
    // Wanted targets
    // ========================================================================

    /// Start (or keep) looking for a target.
    pub async fn add_wanted(&self, target: Target, mut criteria: SearchCriteria) {
        criteria.target_id = target.id.clone();
        info!(target_id = %target.id, terms = %criteria.terms, "Target wanted");
        self.wanted
            .write()
            .await
            .insert(target.id.clone(), WantedTarget { target, criteria });
    }

    pub async fn remove_wanted(&self, target_id: &TargetId) -> bool {
        self.wanted.write().await.remove(target_id).is_some()
    }

    pub async fn wanted(&self) -> Vec<WantedTarget> {
        self.wanted.read().await.values().cloned().collect()
    }

    async fn wanted_target(&self, target_id: &TargetId) -> Result<WantedTarget, OrchestratorError> {
        self.wanted
            .read()
            .await
            .get(target_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownTarget(target_id.clone()))
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Search every source for `criteria` and evaluate the results against
    /// the target's profile. Accepted decisions come first, best first.
    pub async fn search_releases(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Decision>, OrchestratorError> {
        self.search_releases_with_cancel(criteria, &CancelSignal::never())
            .await
    }

    pub async fn search_releases_with_cancel(
        &self,
        criteria: &SearchCriteria,
        cancel: &CancelSignal,
    ) -> Result<Vec<Decision>, OrchestratorError> {
        let wanted = self.wanted_target(&criteria.target_id).await?;
        let mut target = self.effective_target(&wanted.target)?;
        target.force |= criteria.force;

        let releases = match self.aggregator.search(criteria, cancel).await {
            Ok(result) => {
                for (source, error) in &result.source_errors {
                    debug!(source = %source, error = %error, "Source failed during search");
                }
                result.releases
            }
            Err(SearchError::NoSourcesEnabled) => {
                warn!(target_id = %criteria.target_id, "No enabled sources, nothing to search");
                Vec::new()
            }
        };

        self.decide(releases, &target, &criteria.categories)
    }

    /// Grab an accepted decision for `target_id`.
    pub async fn grab(
        &self,
        target_id: &TargetId,
        decision: Decision,
    ) -> Result<TrackedDownload, OrchestratorError> {
        if !decision.accepted {
            let reason = decision
                .first_rejection()
                .map(|r| r.to_string())
                .unwrap_or_default();
            return Err(OrchestratorError::NotAccepted(reason));
        }
        Ok(self.manager.grab(decision, target_id.clone()).await?)
    }

    pub fn get_queue(&self) -> Result<Vec<TrackedDownload>, OrchestratorError> {
        Ok(self.manager.get_queue()?)
    }

    pub async fn remove_from_queue(
        &self,
        id: Uuid,
        blocklist: bool,
    ) -> Result<TrackedDownload, OrchestratorError> {
        Ok(self.manager.remove(id, blocklist).await?)
    }

    pub async fn retry_import(&self, id: Uuid) -> Result<TrackedDownload, OrchestratorError> {
        Ok(self.manager.retry_import(id).await?)
    }

    /// Search for a wanted target and grab the best accepted release, unless
    /// a download for it is already in flight.
    pub async fn search_and_grab(
        &self,
        target_id: &TargetId,
    ) -> Result<Option<TrackedDownload>, OrchestratorError> {
        let lock = self.grab_lock(target_id);
        let _guard = lock.lock().await;

        if self.has_active_download(target_id)? {
            debug!(target_id = %target_id, "Download already in flight, skipping search");
            return Ok(None);
        }

        let wanted = self.wanted_target(target_id).await?;
        let decisions = self.search_releases(&wanted.criteria).await?;
        self.grab_best(target_id, decisions).await
    }

    /// Evaluate the latest releases of every source against every wanted
    /// target they name, grabbing the best match per target. Returns the
    /// number of grabs.
    pub async fn sync_recent(&self, cancel: &CancelSignal) -> Result<usize, OrchestratorError> {
        let wanted = self.wanted().await;
        if wanted.is_empty() {
            return Ok(0);
        }

        let releases = match self.aggregator.search_recent(cancel).await {
            Ok(result) => result.releases,
            Err(SearchError::NoSourcesEnabled) => return Ok(0),
        };

        let mut grabs = 0;
        for entry in wanted {
            let matching: Vec<ReleaseInfo> = releases
                .iter()
                .filter(|r| release_names_target(r, &entry.criteria))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }

            let lock = self.grab_lock(&entry.target.id);
            let _guard = lock.lock().await;
            if self.has_active_download(&entry.target.id)? {
                continue;
            }

            let target = self.effective_target(&entry.target)?;
            let decisions = self.decide(matching, &target, &entry.criteria.categories)?;
            if self.grab_best(&target.id, decisions).await?.is_some() {
                grabs += 1;
            }
        }

        if grabs > 0 {
            info!(grabs, "Recent release sync grabbed releases");
        }
        Ok(grabs)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn decide(
        &self,
        releases: Vec<ReleaseInfo>,
        target: &Target,
        categories: &[u32],
    ) -> Result<Vec<Decision>, OrchestratorError> {
        let profile = self
            .profiles
            .profile(&target.profile_id)
            .ok_or_else(|| OrchestratorError::UnknownProfile(target.profile_id.clone()))?;

        let context = EvaluationContext {
            blocklist: self.blocklist.for_target(&target.id)?,
            custom_formats: self.profiles.custom_formats(),
            categories: categories.to_vec(),
            now: Utc::now(),
        };

        Ok(self.engine.evaluate(releases, target, &profile, &context))
    }

    async fn grab_best(
        &self,
        target_id: &TargetId,
        decisions: Vec<Decision>,
    ) -> Result<Option<TrackedDownload>, OrchestratorError> {
        let Some(best) = decisions.into_iter().find(|d| d.accepted) else {
            debug!(target_id = %target_id, "No acceptable release found");
            return Ok(None);
        };
        let download = self.grab(target_id, best).await?;
        Ok(Some(download))
    }

    fn grab_lock(&self, target_id: &TargetId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .grab_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(target_id.clone()).or_default().clone()
    }

    fn has_active_download(&self, target_id: &TargetId) -> Result<bool, OrchestratorError> {
        Ok(self
            .downloads
            .for_target(target_id)?
            .iter()
            .any(|d| !d.state.is_terminal() && d.state != TrackedState::Failed))
    }

    /// The target with its held file taken from the latest successful
    /// import, when that is newer than what the caller registered.
    fn effective_target(&self, target: &Target) -> Result<Target, OrchestratorError> {
        let latest_import = self
            .downloads
            .for_target(&target.id)?
            .into_iter()
            .filter(|d| d.state == TrackedState::Imported)
            .max_by_key(|d| d.updated_at);

        let mut target = target.clone();
        if let Some(imported) = latest_import {
            target.current = Some(HeldFile {
                quality: imported.decision.release.quality,
                custom_format_score: imported
                    .decision
                    .score
                    .map(|s| s.custom_format_score)
                    .unwrap_or_default(),
            });
        }
        Ok(target)
    }
}

/// Whether a recent release is for the target `criteria` searches for.
fn release_names_target(release: &ReleaseInfo, criteria: &SearchCriteria) -> bool {
    let wanted = normalize_title(&criteria.terms);
    if wanted.is_empty() || release.parsed.normalized_title() != wanted {
        return false;
    }
    match (criteria.year, release.parsed.year) {
        (Some(want), Some(got)) => want == got,
        _ => true,
    }
}

#[async_trait]
impl Redownloader for Pipeline {
    async fn redownload(&self, target_id: &TargetId) {
        match self.search_and_grab(target_id).await {
            Ok(Some(download)) => info!(
                target_id = %target_id,
                title = download.title(),
                "Grabbed replacement release"
            ),
            Ok(None) => info!(target_id = %target_id, "No replacement release available"),
            Err(OrchestratorError::UnknownTarget(_)) => {
                debug!(target_id = %target_id, "Target no longer wanted, not searching again")
            }
            Err(e) => warn!(target_id = %target_id, error = %e, "Replacement search failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::SqliteBlocklistStore;
    use crate::config::{Config, ConfigProfileStore};
    use crate::decision::{RankingConfig, Rejection};
    use crate::events::NotificationHandle;
    use crate::indexer::{ChainExecutor, HttpResponse, Protocol, RateLimiterPool, Source};
    use crate::parser::Quality;
    use crate::searcher::{AggregatorConfig, CircuitBreaker, CircuitBreakerConfig};
    use crate::testing::{fixtures, MockDownloadClient, MockImporter, MockTransport, StaticSource};
    use crate::tracked::{SqliteTrackedDownloadStore, TrackedConfig};
    use std::time::Duration;

    const GB: u64 = 1024 * 1024 * 1024;

    struct Harness {
        pipeline: Arc<Pipeline>,
        transport: Arc<MockTransport>,
        client: Arc<MockDownloadClient>,
        blocklist: Arc<SqliteBlocklistStore>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = Arc::new(MockTransport::new());
            let executor = Arc::new(ChainExecutor::new(
                transport.clone(),
                RateLimiterPool::empty(),
            ));
            let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
            let sources: Vec<Arc<dyn Source>> =
                vec![Arc::new(StaticSource::new("alpha", Protocol::Torrent))];
            let aggregator = Arc::new(SearchAggregator::new(
                sources,
                executor,
                breaker,
                AggregatorConfig {
                    max_concurrency: 2,
                    source_timeout: Duration::from_secs(5),
                },
                NotificationHandle::disconnected(),
            ));

            let config = Config {
                profiles: vec![fixtures::hd_profile("hd")],
                ..Default::default()
            };
            let profiles = Arc::new(ConfigProfileStore::new(&config));

            let client = Arc::new(MockDownloadClient::new());
            let blocklist = Arc::new(SqliteBlocklistStore::in_memory().unwrap());
            let downloads = Arc::new(SqliteTrackedDownloadStore::in_memory().unwrap());
            let manager = Arc::new(TrackedDownloadManager::new(
                downloads.clone(),
                blocklist.clone(),
                client.clone(),
                Arc::new(MockImporter::new()),
                NotificationHandle::disconnected(),
                TrackedConfig::default(),
            ));

            let pipeline = Pipeline::new(
                aggregator,
                DecisionEngine::new(RankingConfig::default()),
                profiles,
                blocklist.clone(),
                downloads,
                manager,
            );

            Self {
                pipeline,
                transport,
                client,
                blocklist,
            }
        }

        async fn search_results(&self, lines: &[(&str, u64)]) {
            let body = lines
                .iter()
                .map(|(title, size)| format!("{}|{}|40", title, size))
                .collect::<Vec<_>>()
                .join("\n");
            self.transport
                .respond("static://alpha/search", HttpResponse::ok(body))
                .await;
        }

        async fn want_movie(&self) -> SearchCriteria {
            let criteria = SearchCriteria::new("movie-1", "Movie Name");
            self.pipeline
                .add_wanted(fixtures::target("movie-1", "hd"), criteria.clone())
                .await;
            criteria
        }
    }

    #[tokio::test]
    async fn test_search_unknown_target_fails() {
        let h = Harness::new();
        let criteria = SearchCriteria::new("nobody", "Nothing");

        let err = h.pipeline.search_releases(&criteria).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownTarget(_)));
    }

    #[tokio::test]
    async fn test_search_returns_accepted_best_first() {
        let h = Harness::new();
        let criteria = h.want_movie().await;
        h.search_results(&[
            ("Movie.Name.2020.480p.DVDRip.x264-OLD", GB),
            ("Movie.Name.2020.720p.HDTV.x264-GRP", 2 * GB),
            ("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB),
        ])
        .await;

        let decisions = h.pipeline.search_releases(&criteria).await.unwrap();
        assert_eq!(decisions.len(), 3);
        assert!(decisions[0].accepted);
        assert_eq!(decisions[0].release.quality.quality, Quality::Bluray1080p);
        assert!(decisions[1].accepted);
        assert!(!decisions[2].accepted);
    }

    #[tokio::test]
    async fn test_grab_rejected_decision_is_refused() {
        let h = Harness::new();
        let release = fixtures::release("Movie.Name.2020.1080p.BluRay", Protocol::Torrent);
        let decision = Decision::rejected(release, vec![Rejection::Blocklisted]);

        let err = h
            .pipeline
            .grab(&TargetId::new("movie-1"), decision)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotAccepted(_)));
        assert!(h.client.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_grab_and_remove_with_blocklist() {
        let h = Harness::new();
        let criteria = h.want_movie().await;
        h.search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
            .await;

        let best = h
            .pipeline
            .search_releases(&criteria)
            .await
            .unwrap()
            .remove(0);
        let download = h.pipeline.grab(&criteria.target_id, best).await.unwrap();
        assert_eq!(h.pipeline.get_queue().unwrap().len(), 1);

        let removed = h
            .pipeline
            .remove_from_queue(download.id, true)
            .await
            .unwrap();
        assert_eq!(removed.state, TrackedState::Blocklisted);
        assert!(h.pipeline.get_queue().unwrap().is_empty());
        assert_eq!(h.blocklist.for_target(&criteria.target_id).unwrap().len(), 1);

        let again = h.pipeline.search_releases(&criteria).await.unwrap();
        assert!(!again[0].accepted);
        assert!(again[0].rejections.contains(&Rejection::Blocklisted));
    }

    #[tokio::test]
    async fn test_search_and_grab_skips_target_with_active_download() {
        let h = Harness::new();
        let criteria = h.want_movie().await;
        h.search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
            .await;

        let first = h
            .pipeline
            .search_and_grab(&criteria.target_id)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = h
            .pipeline
            .search_and_grab(&criteria.target_id)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(h.client.submitted().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_search_and_grab_grabs_once() {
        let h = Harness::new();
        let criteria = h.want_movie().await;
        h.search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
            .await;

        let (first, second) = tokio::join!(
            h.pipeline.search_and_grab(&criteria.target_id),
            h.pipeline.search_and_grab(&criteria.target_id)
        );
        let grabbed = [first.unwrap(), second.unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();

        assert_eq!(grabbed, 1);
        assert_eq!(h.client.submitted().await.len(), 1);
        assert_eq!(h.pipeline.get_queue().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_download_triggers_replacement_grab() {
        let h = Harness::new();
        let criteria = h.want_movie().await;
        h.search_results(&[
            ("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB),
            ("Movie.Name.2020.720p.HDTV.x264-GRP", 2 * GB),
        ])
        .await;

        let first = h
            .pipeline
            .search_and_grab(&criteria.target_id)
            .await
            .unwrap()
            .unwrap();
        let client_id = first.client_id.clone().unwrap();
        h.client.error(&client_id, "tracker gone").await;

        h.pipeline.manager().poll_once().await.unwrap();

        let failed = h.pipeline.manager().get(first.id).unwrap();
        assert_eq!(failed.state, TrackedState::Blocklisted);

        let queue = h.pipeline.get_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue[0].decision.release.title,
            "Movie.Name.2020.720p.HDTV.x264-GRP"
        );
    }

    #[tokio::test]
    async fn test_imported_file_blocks_same_quality() {
        let h = Harness::new();
        let criteria = h.want_movie().await;
        h.search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
            .await;

        let download = h
            .pipeline
            .search_and_grab(&criteria.target_id)
            .await
            .unwrap()
            .unwrap();
        h.client
            .complete(&download.client_id.clone().unwrap(), "/downloads/movie")
            .await;
        h.pipeline.manager().poll_once().await.unwrap();
        assert_eq!(
            h.pipeline.manager().get(download.id).unwrap().state,
            TrackedState::Imported
        );

        let decisions = h.pipeline.search_releases(&criteria).await.unwrap();
        assert!(!decisions[0].accepted);
    }

    #[tokio::test]
    async fn test_sync_recent_grabs_matching_release_once() {
        let h = Harness::new();
        h.want_movie().await;
        h.transport
            .respond(
                "static://alpha/recent",
                HttpResponse::ok(
                    "Other.Film.2019.1080p.BluRay.x264-GRP|8589934592|20\n\
                     Movie.Name.2020.1080p.WEB-DL.x264-GRP|4294967296|30",
                ),
            )
            .await;

        let grabs = h.pipeline.sync_recent(&CancelSignal::never()).await.unwrap();
        assert_eq!(grabs, 1);
        let submitted = h.client.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].release.title.starts_with("Movie.Name.2020"));

        let grabs = h.pipeline.sync_recent(&CancelSignal::never()).await.unwrap();
        assert_eq!(grabs, 0);
    }

    #[tokio::test]
    async fn test_sync_recent_without_wanted_targets_fetches_nothing() {
        let h = Harness::new();
        let grabs = h.pipeline.sync_recent(&CancelSignal::never()).await.unwrap();
        assert_eq!(grabs, 0);
        assert!(h.transport.requested().await.is_empty());
    }

    #[test]
    fn test_release_names_target_respects_year() {
        let mut criteria = SearchCriteria::new("m", "The Movie");
        criteria.year = Some(2020);

        let hit = ReleaseInfo::new("The.Movie.2020.1080p.BluRay", "u", "s", Protocol::Torrent)
            .with_parsed();
        let wrong_year =
            ReleaseInfo::new("The.Movie.1999.1080p.BluRay", "u", "s", Protocol::Torrent)
                .with_parsed();
        let other =
            ReleaseInfo::new("Another.Movie.2020.1080p", "u", "s", Protocol::Torrent).with_parsed();

        assert!(release_names_target(&hit, &criteria));
        assert!(!release_names_target(&wrong_year, &criteria));
        assert!(!release_names_target(&other, &criteria));
    }
}

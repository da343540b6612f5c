//! Pipeline lifecycle integration tests.
//!
//! These tests run the scheduler against mock collaborators and verify the
//! tracked download lifecycle:
//! queued -> downloading -> completed -> importing -> imported

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mediarr_core::{
    decision::RankingConfig,
    indexer::HttpResponse,
    searcher::{AggregatorConfig, CircuitBreakerConfig},
    testing::{fixtures, MockDownloadClient, MockImporter, MockTransport, StaticSource},
    tracked::TrackedConfig,
    BlocklistStore, ChainExecutor, CircuitBreaker, ClientDownloadId, ClientState, Config,
    ConfigProfileStore, DecisionEngine, ImportFailure, ImportOutcome, NotificationHandle,
    OrchestratorConfig, Pipeline, Protocol, RateLimiterPool, Scheduler, SearchAggregator,
    SearchCriteria, Source, SqliteBlocklistStore, SqliteTrackedDownloadStore, TargetId,
    TrackedDownload, TrackedDownloadManager, TrackedDownloadStore, TrackedState,
};

const GB: u64 = 1024 * 1024 * 1024;

/// Test helper wiring a pipeline over mocks and file-backed stores.
struct TestHarness {
    transport: Arc<MockTransport>,
    client: Arc<MockDownloadClient>,
    importer: Arc<MockImporter>,
    downloads: Arc<SqliteTrackedDownloadStore>,
    blocklist: Arc<SqliteBlocklistStore>,
    pipeline: Arc<Pipeline>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let downloads = Arc::new(
            SqliteTrackedDownloadStore::new(&db_path).expect("Failed to create download store"),
        );
        let blocklist =
            Arc::new(SqliteBlocklistStore::new(&db_path).expect("Failed to create blocklist"));
        Self::with_stores(temp_dir, downloads, blocklist)
    }

    fn with_stores(
        temp_dir: TempDir,
        downloads: Arc<SqliteTrackedDownloadStore>,
        blocklist: Arc<SqliteBlocklistStore>,
    ) -> Self {
        let transport = Arc::new(MockTransport::new());
        let client = Arc::new(MockDownloadClient::new());
        let importer = Arc::new(MockImporter::new());

        let sources: Vec<Arc<dyn Source>> =
            vec![Arc::new(StaticSource::new("alpha", Protocol::Torrent))];
        let aggregator = Arc::new(SearchAggregator::new(
            sources,
            Arc::new(ChainExecutor::new(
                transport.clone(),
                RateLimiterPool::empty(),
            )),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
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

        let manager = Arc::new(TrackedDownloadManager::new(
            downloads.clone(),
            blocklist.clone(),
            client.clone(),
            importer.clone(),
            NotificationHandle::disconnected(),
            TrackedConfig::default(),
        ));

        let pipeline = Pipeline::new(
            aggregator,
            DecisionEngine::new(RankingConfig::default()),
            Arc::new(ConfigProfileStore::new(&config)),
            blocklist.clone(),
            downloads.clone(),
            manager,
        );

        Self {
            transport,
            client,
            importer,
            downloads,
            blocklist,
            pipeline,
            _temp_dir: temp_dir,
        }
    }

    fn create_scheduler(&self) -> Scheduler {
        let config = OrchestratorConfig {
            enabled: true,
            download_poll_interval_ms: 20,
            rss_sync_interval_secs: 3600,
            import_retry_interval_secs: 1,
            ..Default::default()
        };
        Scheduler::new(config, Arc::clone(&self.pipeline))
    }

    async fn search_results(&self, titles: &[(&str, u64)]) {
        let body = titles
            .iter()
            .map(|(title, size)| format!("{}|{}|40", title, size))
            .collect::<Vec<_>>()
            .join("\n");
        self.transport
            .respond("static://alpha/search", HttpResponse::ok(body))
            .await;
    }

    async fn want_movie(&self) -> TargetId {
        let target_id = TargetId::new("movie-1");
        self.pipeline
            .add_wanted(
                fixtures::target("movie-1", "hd"),
                SearchCriteria::new(target_id.as_str(), "Movie Name"),
            )
            .await;
        target_id
    }

    async fn grab_best(&self, target_id: &TargetId) -> TrackedDownload {
        self.pipeline
            .search_and_grab(target_id)
            .await
            .expect("Search failed")
            .expect("Nothing grabbed")
    }

    async fn wait_for_state(
        &self,
        download: &TrackedDownload,
        expected: TrackedState,
        timeout: Duration,
    ) -> bool {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(20);

        while start.elapsed() < timeout {
            if let Ok(Some(current)) = self.downloads.get(download.id) {
                if current.state == expected {
                    return true;
                }
                // Stop if we hit a terminal state
                if current.state.is_terminal() {
                    return false;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
        false
    }

    fn state_of(&self, download: &TrackedDownload) -> Option<TrackedState> {
        self.downloads
            .get(download.id)
            .ok()
            .flatten()
            .map(|d| d.state)
    }
}

fn client_id(download: &TrackedDownload) -> ClientDownloadId {
    download.client_id.clone().expect("Download has no client id")
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_download_is_imported_after_client_completes() {
    let harness = TestHarness::new();
    let target_id = harness.want_movie().await;
    harness
        .search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
        .await;

    let scheduler = harness.create_scheduler();
    scheduler.start().await;

    let download = harness.grab_best(&target_id).await;
    assert_eq!(download.state, TrackedState::Queued);

    harness
        .client
        .set_state(&client_id(&download), ClientState::Downloading)
        .await;
    assert!(
        harness
            .wait_for_state(&download, TrackedState::Downloading, Duration::from_secs(2))
            .await
    );

    harness
        .client
        .complete(&client_id(&download), "/downloads/movie")
        .await;
    let imported = harness
        .wait_for_state(&download, TrackedState::Imported, Duration::from_secs(2))
        .await;

    scheduler.stop().await;

    assert!(imported, "Download should have been imported");
    assert_eq!(harness.importer.call_count().await, 1);
    assert!(harness.pipeline.get_queue().unwrap().is_empty());
}

#[tokio::test]
async fn test_client_error_blocklists_and_grabs_replacement() {
    let harness = TestHarness::new();
    let target_id = harness.want_movie().await;
    harness
        .search_results(&[
            ("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB),
            ("Movie.Name.2020.720p.HDTV.x264-GRP", 2 * GB),
        ])
        .await;

    let scheduler = harness.create_scheduler();
    scheduler.start().await;

    let first = harness.grab_best(&target_id).await;
    harness
        .client
        .set_state(&client_id(&first), ClientState::Downloading)
        .await;
    assert!(
        harness
            .wait_for_state(&first, TrackedState::Downloading, Duration::from_secs(2))
            .await
    );

    harness
        .client
        .error(&client_id(&first), "Tracker unregistered torrent")
        .await;

    let start = std::time::Instant::now();
    while harness.client.submitted().await.len() < 2 && start.elapsed() < Duration::from_secs(2)
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    scheduler.stop().await;

    assert_eq!(harness.state_of(&first), Some(TrackedState::Blocklisted));
    assert_eq!(harness.blocklist.for_target(&target_id).unwrap().len(), 1);

    let submitted = harness.client.submitted().await;
    assert_eq!(submitted.len(), 2);
    assert_eq!(
        submitted[1].release.title,
        "Movie.Name.2020.720p.HDTV.x264-GRP"
    );

    let history: Vec<TrackedState> = harness
        .downloads
        .get(first.id)
        .unwrap()
        .unwrap()
        .history
        .iter()
        .map(|t| t.to)
        .collect();
    assert!(history.contains(&TrackedState::Failed));
}

#[tokio::test]
async fn test_no_matching_files_is_not_retried_automatically() {
    let harness = TestHarness::new();
    let target_id = harness.want_movie().await;
    harness
        .search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
        .await;
    harness
        .importer
        .push_outcome(ImportOutcome::Failed(ImportFailure::NoMatchingFiles))
        .await;

    let scheduler = harness.create_scheduler();
    scheduler.start().await;

    let download = harness.grab_best(&target_id).await;
    harness
        .client
        .complete(&client_id(&download), "/downloads/movie")
        .await;
    assert!(
        harness
            .wait_for_state(&download, TrackedState::ImportFailed, Duration::from_secs(2))
            .await
    );

    // Long enough for at least one import retry sweep
    tokio::time::sleep(Duration::from_millis(1500)).await;
    scheduler.stop().await;

    assert_eq!(harness.state_of(&download), Some(TrackedState::ImportFailed));
    assert_eq!(harness.importer.call_count().await, 1);

    let failed = harness.downloads.get(download.id).unwrap().unwrap();
    assert_eq!(failed.last_error.as_deref(), Some("No matching media files"));

    // A manual retry still goes through
    let retried = harness.pipeline.retry_import(download.id).await.unwrap();
    assert_eq!(retried.state, TrackedState::Imported);
}

#[tokio::test]
async fn test_interrupted_import_is_resumed_on_start() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let release = fixtures::torrent_release("Movie.Name.2020.1080p.BluRay.x264-GROUP", "abc");
    let mut download = TrackedDownload::new(
        TargetId::new("movie-1"),
        fixtures::accepted(release),
        ClientDownloadId::new("abc"),
    );
    download.output_path = Some("/downloads/movie".into());
    for state in [
        TrackedState::Downloading,
        TrackedState::Completed,
        TrackedState::Importing,
    ] {
        download.transition_to(state, None).unwrap();
    }

    {
        let store = SqliteTrackedDownloadStore::new(&db_path).unwrap();
        store.insert(&download).unwrap();
    }

    let downloads = Arc::new(SqliteTrackedDownloadStore::new(&db_path).unwrap());
    let blocklist = Arc::new(SqliteBlocklistStore::new(&db_path).unwrap());
    let harness = TestHarness::with_stores(temp_dir, downloads, blocklist);

    let scheduler = harness.create_scheduler();
    scheduler.start().await;
    let imported = harness
        .wait_for_state(&download, TrackedState::Imported, Duration::from_secs(2))
        .await;
    scheduler.stop().await;

    assert!(imported, "Interrupted import should have been resumed");
    let history = harness.downloads.get(download.id).unwrap().unwrap().history;
    assert!(history
        .iter()
        .any(|t| t.from == TrackedState::Importing && t.to == TrackedState::Completed));
}

#[tokio::test]
async fn test_scheduler_status_and_restart() {
    let harness = TestHarness::new();
    let target_id = harness.want_movie().await;
    harness
        .search_results(&[("Movie.Name.2020.1080p.BluRay.x264-GROUP", 8 * GB)])
        .await;
    harness.grab_best(&target_id).await;

    let scheduler = harness.create_scheduler();
    assert!(!scheduler.status().await.running);

    scheduler.start().await;
    let status = scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.wanted, 1);
    assert_eq!(status.queued, 1);

    scheduler.stop().await;
    assert!(!scheduler.is_running());

    scheduler.start().await;
    assert!(scheduler.is_running());
    scheduler.stop().await;
}

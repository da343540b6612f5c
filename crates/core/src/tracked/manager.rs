//! Tracked download lifecycle: grabbing, polling, importing and failure
//! escalation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{transition, TrackedDownload, TrackedDownloadStore, TrackedError, TrackedState};
use crate::blocklist::{BlocklistEntry, BlocklistStore};
use crate::decision::Decision;
use crate::download_client::{DownloadClient, DownloadClientError};
use crate::events::{Notification, NotificationHandle};
use crate::import::{ImportFailure, ImportOutcome, Importer};
use crate::indexer::TargetId;
use crate::metrics;

/// Retry and escalation settings.
#[derive(Debug, Clone)]
pub struct TrackedConfig {
    /// Consecutive transient client errors before a download fails.
    pub max_poll_attempts: u32,
    pub poll_backoff_base: Duration,
    pub max_poll_backoff: Duration,
    /// Blocklist the release when its download fails.
    pub auto_blocklist: bool,
    /// After blocklisting, search again for the same target.
    pub auto_redownload: bool,
    /// Automatic attempts for retryable import failures.
    pub max_import_attempts: u32,
}

impl Default for TrackedConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 5,
            poll_backoff_base: Duration::from_secs(30),
            max_poll_backoff: Duration::from_secs(30 * 60),
            auto_blocklist: true,
            auto_redownload: true,
            max_import_attempts: 3,
        }
    }
}

/// Searches again for a target after its download was blocklisted.
#[async_trait]
pub trait Redownloader: Send + Sync {
    async fn redownload(&self, target_id: &TargetId);
}

/// Counts from one polling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub polled: usize,
    pub completed: usize,
    pub imported: usize,
    pub failed: usize,
}

/// Owns every state change of a [`TrackedDownload`].
pub struct TrackedDownloadManager {
    store: Arc<dyn TrackedDownloadStore>,
    blocklist: Arc<dyn BlocklistStore>,
    client: Arc<dyn DownloadClient>,
    importer: Arc<dyn Importer>,
    notifications: NotificationHandle,
    config: TrackedConfig,
    import_locks: Mutex<HashMap<TargetId, Arc<tokio::sync::Mutex<()>>>>,
    redownloader: OnceCell<Weak<dyn Redownloader>>,
}

impl TrackedDownloadManager {
    pub fn new(
        store: Arc<dyn TrackedDownloadStore>,
        blocklist: Arc<dyn BlocklistStore>,
        client: Arc<dyn DownloadClient>,
        importer: Arc<dyn Importer>,
        notifications: NotificationHandle,
        config: TrackedConfig,
    ) -> Self {
        Self {
            store,
            blocklist,
            client,
            importer,
            notifications,
            config,
            import_locks: Mutex::new(HashMap::new()),
            redownloader: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &TrackedConfig {
        &self.config
    }

    /// Register the component that runs replacement searches. Only the
    /// first registration takes effect.
    pub fn set_redownloader(&self, redownloader: Weak<dyn Redownloader>) {
        if self.redownloader.set(redownloader).is_err() {
            debug!("Redownloader already registered");
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Hand the release behind `decision` to the download client and start
    /// tracking it.
    pub async fn grab(
        &self,
        decision: Decision,
        target_id: TargetId,
    ) -> Result<TrackedDownload, TrackedError> {
        let client_id = self.client.submit(&decision.release).await.map_err(|e| {
            warn!(
                title = %decision.release.title,
                client = self.client.name(),
                error = %e,
                "Download client refused release"
            );
            e
        })?;

        let download = TrackedDownload::new(target_id, decision, client_id);
        self.store.insert(&download)?;

        metrics::GRABS_TOTAL
            .with_label_values(&[download.decision.release.protocol.to_string().as_str()])
            .inc();
        info!(
            download_id = %download.id,
            target_id = %download.target_id,
            title = download.title(),
            "Grabbed release"
        );

        self.notifications
            .emit(Notification::Grabbed {
                download_id: download.id,
                target_id: download.target_id.clone(),
                title: download.title().to_string(),
                source: download.decision.release.source_name.clone(),
            })
            .await;

        Ok(download)
    }

    /// Downloads that have not reached a terminal state, oldest first.
    pub fn get_queue(&self) -> Result<Vec<TrackedDownload>, TrackedError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|d| !d.state.is_terminal())
            .collect())
    }

    pub fn get(&self, id: Uuid) -> Result<TrackedDownload, TrackedError> {
        self.store.get(id)?.ok_or(TrackedError::NotFound(id))
    }

    /// Stop tracking a download, removing it from the client. With
    /// `blocklist` the release is also blocked for its target.
    pub async fn remove(&self, id: Uuid, blocklist: bool) -> Result<TrackedDownload, TrackedError> {
        let target_id = self.get(id)?.target_id;
        let lock = self.target_lock(&target_id);
        let _guard = lock.lock().await;

        let mut download = self.get(id)?;
        let to = if blocklist {
            TrackedState::Blocklisted
        } else {
            TrackedState::Removed
        };
        transition(download.state, to)?;

        self.remove_from_client(&download, true).await;
        if blocklist {
            self.add_to_blocklist(&download, "Removed and blocklisted by user")
                .await?;
        }
        self.apply(&mut download, to, Some("Removed by user".to_string()))
            .await?;

        info!(download_id = %id, blocklisted = blocklist, "Removed download from queue");
        Ok(download)
    }

    /// Manually retry a failed import.
    pub async fn retry_import(&self, id: Uuid) -> Result<TrackedDownload, TrackedError> {
        let download = self.get(id)?;
        if download.state != TrackedState::ImportFailed {
            return Err(TrackedError::InvalidTransition {
                from: download.state,
                to: TrackedState::Importing,
            });
        }
        self.import(id).await
    }

    /// Query the client once for every download in a polling state.
    ///
    /// Client errors are handled per download. Only store faults abort the
    /// pass.
    pub async fn poll_once(&self) -> Result<PollSummary, TrackedError> {
        let now = Utc::now();
        let mut summary = PollSummary::default();

        for download in self.store.in_states(&TrackedState::POLLING)? {
            if download.next_poll_at.is_some_and(|at| at > now) {
                continue;
            }
            summary.polled += 1;

            let id = download.id;
            match self.poll_download(download, &mut summary).await {
                Ok(()) => {}
                Err(e @ TrackedError::Store(_)) => return Err(e),
                Err(e) => warn!(download_id = %id, error = %e, "Failed to update download"),
            }
        }

        if summary.polled > 0 {
            debug!(
                polled = summary.polled,
                completed = summary.completed,
                imported = summary.imported,
                failed = summary.failed,
                "Poll pass finished"
            );
        }
        Ok(summary)
    }

    /// Import completed downloads and retry imports that failed for a
    /// transient reason. Returns the number imported.
    pub async fn import_pending(&self) -> Result<usize, TrackedError> {
        let candidates = self
            .store
            .in_states(&[TrackedState::Completed, TrackedState::ImportFailed])?;

        let mut imported = 0;
        for download in candidates {
            let eligible = download.state == TrackedState::Completed
                || download.can_auto_retry_import(self.config.max_import_attempts);
            if !eligible {
                continue;
            }

            match self.import(download.id).await {
                Ok(d) if d.state == TrackedState::Imported => imported += 1,
                Ok(_) => {}
                Err(e @ TrackedError::Store(_)) => return Err(e),
                Err(e) => warn!(download_id = %download.id, error = %e, "Import retry skipped"),
            }
        }
        Ok(imported)
    }

    /// Resume tracking after a restart. Imports cut short by the restart go
    /// back to `Completed` and are run again. Returns the number of
    /// non-terminal downloads.
    pub async fn recover(&self) -> Result<usize, TrackedError> {
        for mut download in self.store.in_states(&[TrackedState::Importing])? {
            self.apply(
                &mut download,
                TrackedState::Completed,
                Some("Import interrupted by restart".to_string()),
            )
            .await?;
        }

        for mut download in self.store.in_states(&TrackedState::POLLING)? {
            if download.next_poll_at.take().is_some() {
                self.store.update(&download)?;
            }
        }

        let active = self.get_queue()?.len();
        info!(active, "Recovered tracked downloads");

        self.import_pending().await?;
        Ok(active)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn target_lock(&self, target_id: &TargetId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .import_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(target_id.clone()).or_default().clone()
    }

    /// Transition, persist and announce.
    async fn apply(
        &self,
        download: &mut TrackedDownload,
        to: TrackedState,
        reason: Option<String>,
    ) -> Result<(), TrackedError> {
        let from = download.state;
        download.transition_to(to, reason.clone())?;
        self.store.update(download)?;

        debug!(download_id = %download.id, %from, %to, "Download state changed");
        self.notifications
            .emit(Notification::StateChanged {
                download_id: download.id,
                target_id: download.target_id.clone(),
                from,
                to,
                reason,
            })
            .await;
        Ok(())
    }

    fn poll_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.config
            .poll_backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_poll_backoff)
    }

    /// Query the client for one download and apply what it reports.
    ///
    /// The query runs without the target lock. The write happens under it,
    /// against a fresh read of the row, so a download removed or changed
    /// while the client answered is left alone.
    async fn poll_download(
        &self,
        snapshot: TrackedDownload,
        summary: &mut PollSummary,
    ) -> Result<(), TrackedError> {
        let reply = match &snapshot.client_id {
            Some(client_id) => Some(self.client.query_status(client_id).await),
            None => None,
        };

        let guard = self.target_lock(&snapshot.target_id).lock_owned().await;
        let Some(mut download) = self.store.get(snapshot.id)? else {
            return Ok(());
        };
        if download.state != snapshot.state || download.history.len() != snapshot.history.len() {
            debug!(
                download_id = %download.id,
                polled = %snapshot.state,
                now = %download.state,
                "Download changed while polling, discarding client status"
            );
            return Ok(());
        }

        let status = match reply {
            None => {
                return self
                    .fail(guard, download, "Download has no client id".to_string(), summary)
                    .await;
            }
            Some(Ok(status)) => status,
            Some(Err(e @ (DownloadClientError::NotFound(_) | DownloadClientError::Rejected(_)))) => {
                return self.fail(guard, download, e.to_string(), summary).await;
            }
            Some(Err(e)) => {
                download.poll_failures += 1;
                download.last_error = Some(e.to_string());

                if download.poll_failures >= self.config.max_poll_attempts {
                    let reason = format!(
                        "Download client unreachable after {} attempts: {}",
                        download.poll_failures, e
                    );
                    return self.fail(guard, download, reason, summary).await;
                }

                let delay = self.poll_backoff(download.poll_failures);
                download.next_poll_at = chrono::Duration::from_std(delay)
                    .ok()
                    .map(|d| Utc::now() + d);
                self.store.update(&download)?;
                debug!(
                    download_id = %download.id,
                    failures = download.poll_failures,
                    retry_in_secs = delay.as_secs(),
                    error = %e,
                    "Client status query failed, backing off"
                );
                return Ok(());
            }
        };

        download.poll_failures = 0;
        download.next_poll_at = None;
        download.progress = status.progress;
        if status.output_path.is_some() {
            download.output_path = status.output_path.clone();
        }

        match download.state.on_client_state(status.state) {
            None => {
                self.store.update(&download)?;
            }
            Some(TrackedState::Failed) => {
                let reason = status
                    .message
                    .unwrap_or_else(|| "Download client reported an error".to_string());
                self.fail(guard, download, reason, summary).await?;
            }
            Some(TrackedState::Completed) => {
                self.mark_started(&mut download).await?;
                self.apply(&mut download, TrackedState::Completed, None)
                    .await?;
                metrics::DOWNLOADS_COMPLETED.inc();
                summary.completed += 1;

                // The import takes the target lock itself.
                drop(guard);
                let imported = self.import(download.id).await?;
                if imported.state == TrackedState::Imported {
                    summary.imported += 1;
                }
            }
            Some(to) => {
                if to != TrackedState::Downloading {
                    self.mark_started(&mut download).await?;
                }
                if to == TrackedState::Warning {
                    download.last_error = status.message.clone();
                }
                self.apply(&mut download, to, status.message).await?;
            }
        }
        Ok(())
    }

    /// Record `Downloading` for a queued download the client has moved on.
    async fn mark_started(&self, download: &mut TrackedDownload) -> Result<(), TrackedError> {
        if download.state == TrackedState::Queued {
            self.apply(download, TrackedState::Downloading, None).await?;
        }
        Ok(())
    }

    /// Mark a download failed and escalate per configuration. The target
    /// lock is released before a replacement search starts.
    async fn fail(
        &self,
        guard: OwnedMutexGuard<()>,
        mut download: TrackedDownload,
        reason: String,
        summary: &mut PollSummary,
    ) -> Result<(), TrackedError> {
        download.last_error = Some(reason.clone());
        self.apply(&mut download, TrackedState::Failed, Some(reason.clone()))
            .await?;
        metrics::DOWNLOADS_FAILED.inc();
        summary.failed += 1;

        warn!(
            download_id = %download.id,
            target_id = %download.target_id,
            title = download.title(),
            reason = %reason,
            "Download failed"
        );
        self.notifications
            .emit(Notification::DownloadFailed {
                download_id: download.id,
                target_id: download.target_id.clone(),
                title: download.title().to_string(),
                reason: reason.clone(),
            })
            .await;

        if !self.config.auto_blocklist {
            return Ok(());
        }

        self.remove_from_client(&download, true).await;
        self.add_to_blocklist(&download, &reason).await?;
        self.apply(&mut download, TrackedState::Blocklisted, Some(reason))
            .await?;
        drop(guard);

        if self.config.auto_redownload {
            if let Some(redownloader) = self.redownloader.get().and_then(Weak::upgrade) {
                info!(target_id = %download.target_id, "Searching for a replacement release");
                redownloader.redownload(&download.target_id).await;
            }
        }
        Ok(())
    }

    async fn remove_from_client(&self, download: &TrackedDownload, delete_data: bool) {
        let Some(client_id) = &download.client_id else {
            return;
        };
        match self.client.remove(client_id, delete_data).await {
            Ok(()) | Err(DownloadClientError::NotFound(_)) => {}
            Err(e) => warn!(
                download_id = %download.id,
                client_id = %client_id,
                error = %e,
                "Failed to remove download from client"
            ),
        }
    }

    async fn add_to_blocklist(
        &self,
        download: &TrackedDownload,
        reason: &str,
    ) -> Result<(), TrackedError> {
        let entry = BlocklistEntry::for_release(
            download.target_id.clone(),
            &download.decision.release,
            reason,
        );
        self.blocklist.insert(&entry)?;
        metrics::BLOCKLIST_ADDITIONS.inc();

        self.notifications
            .emit(Notification::Blocklisted {
                download_id: download.id,
                target_id: download.target_id.clone(),
                title: download.title().to_string(),
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    /// Run the importer for a `Completed` or `ImportFailed` download under
    /// its target's exclusive lock.
    async fn import(&self, id: Uuid) -> Result<TrackedDownload, TrackedError> {
        let target_id = self.get(id)?.target_id;
        let lock = self.target_lock(&target_id);
        let _guard = lock.lock().await;

        let mut download = self.get(id)?;
        self.apply(&mut download, TrackedState::Importing, None)
            .await?;
        download.import_attempts += 1;

        let outcome = match download.output_path.clone() {
            Some(path) => self.importer.import(&download.decision, &path).await,
            None => ImportOutcome::Failed(ImportFailure::NoMatchingFiles),
        };

        match outcome {
            ImportOutcome::Imported(files) => {
                download.imported_files = files.clone();
                download.last_import_failure = None;
                download.last_error = None;
                self.apply(&mut download, TrackedState::Imported, None)
                    .await?;
                metrics::IMPORTS_TOTAL.with_label_values(&["imported"]).inc();

                info!(
                    download_id = %download.id,
                    files = files.len(),
                    importer = self.importer.name(),
                    "Import succeeded"
                );
                self.notifications
                    .emit(Notification::ImportSucceeded {
                        download_id: download.id,
                        target_id: download.target_id.clone(),
                        title: download.title().to_string(),
                        files,
                    })
                    .await;
            }
            ImportOutcome::Failed(failure) => {
                let reason = failure.to_string();
                download.last_import_failure = Some(failure.clone());
                download.last_error = Some(reason.clone());
                self.apply(&mut download, TrackedState::ImportFailed, Some(reason.clone()))
                    .await?;
                metrics::IMPORTS_TOTAL.with_label_values(&["failed"]).inc();

                let retryable = download.can_auto_retry_import(self.config.max_import_attempts);
                warn!(
                    download_id = %download.id,
                    reason = failure.reason(),
                    attempts = download.import_attempts,
                    retryable,
                    "Import failed"
                );
                self.notifications
                    .emit(Notification::ImportFailed {
                        download_id: download.id,
                        target_id: download.target_id.clone(),
                        title: download.title().to_string(),
                        reason,
                        retryable,
                    })
                    .await;
            }
        }

        Ok(download)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::SqliteBlocklistStore;
    use crate::events::NotificationEnvelope;
    use crate::testing::fixtures;
    use crate::testing::{MockDownloadClient, MockImporter};
    use crate::download_client::ClientState;
    use crate::tracked::types::tests::listed_edge;
    use crate::tracked::SqliteTrackedDownloadStore;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct Harness {
        manager: Arc<TrackedDownloadManager>,
        client: Arc<MockDownloadClient>,
        importer: Arc<MockImporter>,
        blocklist: Arc<SqliteBlocklistStore>,
        store: Arc<SqliteTrackedDownloadStore>,
        events: mpsc::Receiver<NotificationEnvelope>,
    }

    impl Harness {
        fn new(config: TrackedConfig) -> Self {
            let (tx, events) = mpsc::channel(256);
            let client = Arc::new(MockDownloadClient::new());
            let importer = Arc::new(MockImporter::new());
            let blocklist = Arc::new(SqliteBlocklistStore::in_memory().unwrap());
            let store = Arc::new(SqliteTrackedDownloadStore::in_memory().unwrap());
            let manager = Arc::new(TrackedDownloadManager::new(
                store.clone(),
                blocklist.clone(),
                client.clone(),
                importer.clone(),
                NotificationHandle::new(tx),
                config,
            ));
            Self {
                manager,
                client,
                importer,
                blocklist,
                store,
                events,
            }
        }

        async fn grab(&self, title: &str) -> TrackedDownload {
            let release = fixtures::torrent_release(title, &format!("hash-{}", title));
            self.manager
                .grab(fixtures::accepted(release), TargetId::new("movie-1"))
                .await
                .unwrap()
        }

        fn client_id(d: &TrackedDownload) -> crate::download_client::ClientDownloadId {
            d.client_id.clone().unwrap()
        }

        fn drain_kinds(&mut self) -> Vec<&'static str> {
            let mut kinds = Vec::new();
            while let Ok(envelope) = self.events.try_recv() {
                kinds.push(envelope.notification.kind());
            }
            kinds
        }
    }

    struct CountingRedownloader(AtomicUsize);

    #[async_trait]
    impl Redownloader for CountingRedownloader {
        async fn redownload(&self, _target_id: &TargetId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn no_escalation() -> TrackedConfig {
        TrackedConfig {
            auto_blocklist: false,
            auto_redownload: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_grab_tracks_queued_download() {
        let mut h = Harness::new(TrackedConfig::default());
        let d = h.grab("Movie.2020.1080p.BluRay").await;

        assert_eq!(d.state, TrackedState::Queued);
        assert_eq!(h.client.submitted().await.len(), 1);
        assert_eq!(h.manager.get_queue().unwrap().len(), 1);
        assert_eq!(h.drain_kinds(), vec!["grabbed"]);
    }

    #[tokio::test]
    async fn test_grab_propagates_client_refusal() {
        let h = Harness::new(TrackedConfig::default());
        h.client
            .fail_next_submit(DownloadClientError::Rejected("bad".into()))
            .await;

        let release = fixtures::torrent_release("Movie.2020", "h1");
        let err = h
            .manager
            .grab(fixtures::accepted(release), TargetId::new("movie-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackedError::Client(_)));
        assert!(h.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completed_download_is_imported() {
        let mut h = Harness::new(TrackedConfig::default());
        let d = h.grab("Movie.2020.1080p.BluRay").await;
        let id = Harness::client_id(&d);

        h.client
            .set_state(&id, crate::download_client::ClientState::Downloading)
            .await;
        let summary = h.manager.poll_once().await.unwrap();
        assert_eq!(summary.polled, 1);
        assert_eq!(h.manager.get(d.id).unwrap().state, TrackedState::Downloading);

        h.client.complete(&id, "/downloads/movie").await;
        let summary = h.manager.poll_once().await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.imported, 1);

        let done = h.manager.get(d.id).unwrap();
        assert_eq!(done.state, TrackedState::Imported);
        assert_eq!(done.imported_files.len(), 1);
        assert_eq!(h.importer.calls().await[0].path, PathBuf::from("/downloads/movie"));
        assert!(h.manager.get_queue().unwrap().is_empty());
        assert!(h.drain_kinds().contains(&"import_succeeded"));
    }

    #[tokio::test]
    async fn test_client_error_fails_blocklists_and_redownloads() {
        let mut h = Harness::new(TrackedConfig::default());
        let redownloader = Arc::new(CountingRedownloader(AtomicUsize::new(0)));
        let weak: Weak<dyn Redownloader> = Arc::downgrade(&redownloader) as Weak<dyn Redownloader>;
        h.manager.set_redownloader(weak);

        let d = h.grab("Movie.2020.1080p.BluRay").await;
        let id = Harness::client_id(&d);
        h.client
            .set_state(&id, crate::download_client::ClientState::Downloading)
            .await;
        h.manager.poll_once().await.unwrap();

        h.client.error(&id, "tracker error").await;
        let summary = h.manager.poll_once().await.unwrap();
        assert_eq!(summary.failed, 1);

        let failed = h.manager.get(d.id).unwrap();
        assert_eq!(failed.state, TrackedState::Blocklisted);
        let path: Vec<TrackedState> = failed.history.iter().map(|r| r.to).collect();
        assert_eq!(
            path,
            vec![
                TrackedState::Downloading,
                TrackedState::Failed,
                TrackedState::Blocklisted
            ]
        );

        let entries = h.blocklist.for_target(&TargetId::new("movie-1")).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].matches(&d.decision.release));
        assert_eq!(h.client.removed().await.len(), 1);
        assert_eq!(redownloader.0.load(Ordering::SeqCst), 1);

        let kinds = h.drain_kinds();
        assert!(kinds.contains(&"download_failed"));
        assert!(kinds.contains(&"blocklisted"));
    }

    #[tokio::test]
    async fn test_failure_without_escalation_stays_failed() {
        let h = Harness::new(no_escalation());
        let d = h.grab("Movie.2020").await;
        h.client.error(&Harness::client_id(&d), "boom").await;

        h.manager.poll_once().await.unwrap();
        let failed = h.manager.get(d.id).unwrap();
        assert_eq!(failed.state, TrackedState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
        assert!(h.blocklist.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_errors_back_off_then_fail() {
        let h = Harness::new(TrackedConfig {
            max_poll_attempts: 2,
            poll_backoff_base: Duration::ZERO,
            ..no_escalation()
        });
        let d = h.grab("Movie.2020").await;
        h.client
            .fail_status(&Harness::client_id(&d), DownloadClientError::Timeout)
            .await;

        h.manager.poll_once().await.unwrap();
        let after_one = h.manager.get(d.id).unwrap();
        assert_eq!(after_one.state, TrackedState::Queued);
        assert_eq!(after_one.poll_failures, 1);

        h.manager.poll_once().await.unwrap();
        let after_two = h.manager.get(d.id).unwrap();
        assert_eq!(after_two.state, TrackedState::Failed);
    }

    #[tokio::test]
    async fn test_backoff_skips_download_until_due() {
        let h = Harness::new(TrackedConfig {
            poll_backoff_base: Duration::from_secs(3600),
            ..no_escalation()
        });
        let d = h.grab("Movie.2020").await;
        h.client
            .fail_status(
                &Harness::client_id(&d),
                DownloadClientError::ConnectionFailed("refused".into()),
            )
            .await;

        assert_eq!(h.manager.poll_once().await.unwrap().polled, 1);
        assert_eq!(h.manager.poll_once().await.unwrap().polled, 0);
        assert!(h.manager.get(d.id).unwrap().next_poll_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_download_fails_immediately() {
        let h = Harness::new(no_escalation());
        let d = h.grab("Movie.2020").await;
        h.client
            .fail_status(
                &Harness::client_id(&d),
                DownloadClientError::NotFound("gone".into()),
            )
            .await;

        h.manager.poll_once().await.unwrap();
        assert_eq!(h.manager.get(d.id).unwrap().state, TrackedState::Failed);
    }

    #[test]
    fn test_poll_backoff_doubles_and_caps() {
        let h = Harness::new(TrackedConfig {
            poll_backoff_base: Duration::from_secs(10),
            max_poll_backoff: Duration::from_secs(60),
            ..Default::default()
        });
        assert_eq!(h.manager.poll_backoff(1), Duration::from_secs(10));
        assert_eq!(h.manager.poll_backoff(2), Duration::from_secs(20));
        assert_eq!(h.manager.poll_backoff(3), Duration::from_secs(40));
        assert_eq!(h.manager.poll_backoff(4), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_non_retryable_import_failure_waits_for_user() {
        let h = Harness::new(TrackedConfig::default());
        h.importer
            .push_outcome(ImportOutcome::Failed(ImportFailure::NoMatchingFiles))
            .await;
        let d = h.grab("Movie.2020").await;
        h.client.complete(&Harness::client_id(&d), "/downloads/m").await;

        h.manager.poll_once().await.unwrap();
        assert_eq!(h.manager.get(d.id).unwrap().state, TrackedState::ImportFailed);

        assert_eq!(h.manager.import_pending().await.unwrap(), 0);
        assert_eq!(h.importer.call_count().await, 1);

        let retried = h.manager.retry_import(d.id).await.unwrap();
        assert_eq!(retried.state, TrackedState::Imported);
        assert_eq!(retried.import_attempts, 2);
    }

    #[tokio::test]
    async fn test_retryable_import_failure_is_swept_until_limit() {
        let h = Harness::new(TrackedConfig {
            max_import_attempts: 2,
            ..Default::default()
        });
        for _ in 0..3 {
            h.importer
                .push_outcome(ImportOutcome::Failed(ImportFailure::DiskFull))
                .await;
        }
        let d = h.grab("Movie.2020").await;
        h.client.complete(&Harness::client_id(&d), "/downloads/m").await;

        h.manager.poll_once().await.unwrap();
        assert_eq!(h.manager.import_pending().await.unwrap(), 0);
        assert_eq!(h.importer.call_count().await, 2);

        // Attempt limit reached.
        assert_eq!(h.manager.import_pending().await.unwrap(), 0);
        assert_eq!(h.importer.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_retry_import_requires_import_failed() {
        let h = Harness::new(TrackedConfig::default());
        let d = h.grab("Movie.2020").await;
        let err = h.manager.retry_import(d.id).await.unwrap_err();
        assert_eq!(
            err,
            TrackedError::InvalidTransition {
                from: TrackedState::Queued,
                to: TrackedState::Importing,
            }
        );
    }

    #[tokio::test]
    async fn test_remove_with_blocklist() {
        let h = Harness::new(TrackedConfig::default());
        let d = h.grab("Movie.2020").await;

        let removed = h.manager.remove(d.id, true).await.unwrap();
        assert_eq!(removed.state, TrackedState::Blocklisted);
        assert_eq!(h.blocklist.list().unwrap().len(), 1);
        assert_eq!(h.client.removed().await.len(), 1);

        let err = h.manager.remove(d.id, false).await.unwrap_err();
        assert!(matches!(err, TrackedError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_remove_during_poll_is_not_overwritten() {
        let h = Harness::new(TrackedConfig::default());
        let d = h.grab("Movie.2020").await;
        h.client
            .set_state(&Harness::client_id(&d), ClientState::Downloading)
            .await;
        let gate = h.client.hold_status_queries().await;

        let poll = {
            let manager = Arc::clone(&h.manager);
            tokio::spawn(async move { manager.poll_once().await })
        };
        h.client.wait_for_status_query().await;

        let removed = h.manager.remove(d.id, false).await.unwrap();
        assert_eq!(removed.state, TrackedState::Removed);

        gate.add_permits(1);
        let summary = poll.await.unwrap().unwrap();
        assert_eq!(summary.failed, 0);

        let after = h.manager.get(d.id).unwrap();
        assert_eq!(after.state, TrackedState::Removed);
        let path: Vec<TrackedState> = after.history.iter().map(|r| r.to).collect();
        assert_eq!(path, vec![TrackedState::Removed]);
        assert!(h.blocklist.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queued_download_completing_records_downloading() {
        let h = Harness::new(TrackedConfig::default());
        let d = h.grab("Movie.2020").await;
        h.client.complete(&Harness::client_id(&d), "/downloads/m").await;

        h.manager.poll_once().await.unwrap();
        let done = h.manager.get(d.id).unwrap();
        let path: Vec<TrackedState> = done.history.iter().map(|r| r.to).collect();
        assert_eq!(
            path,
            vec![
                TrackedState::Downloading,
                TrackedState::Completed,
                TrackedState::Importing,
                TrackedState::Imported
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_is_not_found() {
        let h = Harness::new(TrackedConfig::default());
        let id = Uuid::new_v4();
        assert_eq!(
            h.manager.remove(id, false).await.unwrap_err(),
            TrackedError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn test_recover_resumes_interrupted_import() {
        let h = Harness::new(TrackedConfig::default());
        let mut d = h.grab("Movie.2020").await;
        d.transition_to(TrackedState::Downloading, None).unwrap();
        d.transition_to(TrackedState::Completed, None).unwrap();
        d.transition_to(TrackedState::Importing, None).unwrap();
        d.output_path = Some(PathBuf::from("/downloads/m"));
        h.store.update(&d).unwrap();

        let active = h.manager.recover().await.unwrap();
        assert_eq!(active, 1);

        let recovered = h.manager.get(d.id).unwrap();
        assert_eq!(recovered.state, TrackedState::Imported);
        let states: Vec<TrackedState> = recovered.history.iter().map(|r| r.to).collect();
        assert!(states.ends_with(&[
            TrackedState::Completed,
            TrackedState::Importing,
            TrackedState::Imported
        ]));
    }

    #[derive(Debug, Clone)]
    enum ClientEvent {
        Report(ClientState),
        Unreachable,
    }

    fn client_event() -> impl Strategy<Value = ClientEvent> {
        prop_oneof![
            Just(ClientEvent::Report(ClientState::Queued)),
            Just(ClientEvent::Report(ClientState::Downloading)),
            Just(ClientEvent::Report(ClientState::Warning)),
            Just(ClientEvent::Report(ClientState::Error)),
            Just(ClientEvent::Report(ClientState::Completed)),
            Just(ClientEvent::Unreachable),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_polled_downloads_only_take_listed_edges(
            events in prop::collection::vec(client_event(), 1..25),
            import_fails in any::<bool>(),
            escalate in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let history = runtime.block_on(async {
                let h = Harness::new(TrackedConfig {
                    max_poll_attempts: 3,
                    poll_backoff_base: Duration::ZERO,
                    auto_blocklist: escalate,
                    auto_redownload: false,
                    ..Default::default()
                });
                if import_fails {
                    h.importer
                        .push_outcome(ImportOutcome::Failed(ImportFailure::DiskFull))
                        .await;
                }
                let d = h.grab("Movie.2020").await;
                let id = Harness::client_id(&d);

                for event in events {
                    match event {
                        ClientEvent::Report(ClientState::Completed) => {
                            h.client.complete(&id, "/downloads/m").await
                        }
                        ClientEvent::Report(state) => h.client.set_state(&id, state).await,
                        ClientEvent::Unreachable => {
                            h.client.fail_status(&id, DownloadClientError::Timeout).await
                        }
                    }
                    h.manager.poll_once().await.unwrap();
                    h.manager.import_pending().await.unwrap();
                }
                h.manager.get(d.id).unwrap().history
            });

            if let Some(first) = history.first() {
                prop_assert_eq!(first.from, TrackedState::Queued);
            }
            for record in &history {
                prop_assert!(
                    listed_edge(record.from, record.to),
                    "{} -> {} is not a listed edge",
                    record.from,
                    record.to
                );
            }
            for pair in history.windows(2) {
                prop_assert_eq!(pair[0].to, pair[1].from);
            }
        }
    }
}

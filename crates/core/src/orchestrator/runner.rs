//! Background scheduler.
//!
//! Runs independent periodic tasks, each on its own interval:
//! - Recent release sync: evaluate the newest releases of every source
//!   against the wanted targets
//! - Download poll: advance tracked downloads from their client status
//! - Import retry: import completed downloads and retry failed imports

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::config::OrchestratorConfig;
use super::pipeline::Pipeline;
use super::types::SchedulerStatus;
use crate::indexer::CancelSignal;

/// Drives the pipeline in the background.
pub struct Scheduler {
    config: OrchestratorConfig,
    pipeline: Arc<Pipeline>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(config: OrchestratorConfig, pipeline: Arc<Pipeline>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            pipeline,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the scheduler (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!("Starting scheduler");

        // Downloads left mid-flight by the last run
        if let Err(e) = self.pipeline.manager().recover().await {
            error!(error = %e, "Failed to recover tracked downloads");
        }

        self.spawn_rss_sync_loop();
        self.spawn_download_poll_loop();
        self.spawn_import_retry_loop();

        info!("Scheduler started");
    }

    /// Stop the scheduler gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());

        // Give loops a moment to finish current work
        tokio::time::sleep(Duration::from_millis(200)).await;

        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let queued = match self.pipeline.get_queue() {
            Ok(queue) => queue.len(),
            Err(e) => {
                warn!(error = %e, "Failed to read download queue");
                0
            }
        };

        SchedulerStatus {
            running: self.is_running(),
            wanted: self.pipeline.wanted().await.len(),
            queued,
        }
    }

    fn spawn_rss_sync_loop(&self) {
        let running = Arc::clone(&self.running);
        let pipeline = Arc::clone(&self.pipeline);
        let interval = Duration::from_secs(self.config.rss_sync_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Recent release sync loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Recent release sync loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match pipeline.sync_recent(&CancelSignal::never()).await {
                            Ok(grabs) => debug!(grabs, "Recent release sync finished"),
                            Err(e) => warn!(error = %e, "Recent release sync failed"),
                        }
                    }
                }
            }
            info!("Recent release sync loop stopped");
        });
    }

    fn spawn_download_poll_loop(&self) {
        let running = Arc::clone(&self.running);
        let pipeline = Arc::clone(&self.pipeline);
        let interval = Duration::from_millis(self.config.download_poll_interval_ms.max(10));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Download poll loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Download poll loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match pipeline.manager().poll_once().await {
                            Ok(summary) if summary.polled > 0 => debug!(
                                polled = summary.polled,
                                completed = summary.completed,
                                imported = summary.imported,
                                failed = summary.failed,
                                "Polled downloads"
                            ),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Download poll failed"),
                        }
                    }
                }
            }
            info!("Download poll loop stopped");
        });
    }

    fn spawn_import_retry_loop(&self) {
        let running = Arc::clone(&self.running);
        let pipeline = Arc::clone(&self.pipeline);
        let interval = Duration::from_secs(self.config.import_retry_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Import retry loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Import retry loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match pipeline.manager().import_pending().await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "Import sweep processed downloads"),
                            Err(e) => warn!(error = %e, "Import sweep failed"),
                        }
                    }
                }
            }
            info!("Import retry loop stopped");
        });
    }
}

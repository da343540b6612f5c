//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tracked::TrackedConfig;

/// Configuration for the background scheduler and download tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the scheduler.
    /// When disabled, searches and grabs only happen through explicit calls.
    #[serde(default)]
    pub enabled: bool,

    /// How often to query the download client (milliseconds).
    #[serde(default = "default_download_interval")]
    pub download_poll_interval_ms: u64,

    /// How often to pull recent releases from every source (seconds).
    /// 0 disables RSS sync.
    #[serde(default = "default_rss_interval")]
    pub rss_sync_interval_secs: u64,

    /// How often to sweep completed and retryable imports (seconds).
    #[serde(default = "default_import_retry_interval")]
    pub import_retry_interval_secs: u64,

    /// Consecutive transient client errors before a download fails.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_poll_backoff")]
    pub poll_backoff_secs: u64,

    #[serde(default = "default_max_poll_backoff")]
    pub max_poll_backoff_secs: u64,

    /// Blocklist releases whose download failed.
    #[serde(default = "default_true")]
    pub auto_blocklist: bool,

    /// Search again after a failed download was blocklisted.
    #[serde(default = "default_true")]
    pub auto_redownload: bool,

    /// Automatic attempts for imports that failed for a transient reason.
    #[serde(default = "default_max_import_attempts")]
    pub max_import_attempts: u32,
}

fn default_download_interval() -> u64 {
    5000 // 5 seconds
}

fn default_rss_interval() -> u64 {
    900 // 15 minutes
}

fn default_import_retry_interval() -> u64 {
    60
}

fn default_max_poll_attempts() -> u32 {
    5
}

fn default_poll_backoff() -> u64 {
    30
}

fn default_max_poll_backoff() -> u64 {
    1800
}

fn default_true() -> bool {
    true
}

fn default_max_import_attempts() -> u32 {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            download_poll_interval_ms: default_download_interval(),
            rss_sync_interval_secs: default_rss_interval(),
            import_retry_interval_secs: default_import_retry_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            poll_backoff_secs: default_poll_backoff(),
            max_poll_backoff_secs: default_max_poll_backoff(),
            auto_blocklist: true,
            auto_redownload: true,
            max_import_attempts: default_max_import_attempts(),
        }
    }
}

impl OrchestratorConfig {
    pub fn tracked_config(&self) -> TrackedConfig {
        TrackedConfig {
            max_poll_attempts: self.max_poll_attempts.max(1),
            poll_backoff_base: Duration::from_secs(self.poll_backoff_secs),
            max_poll_backoff: Duration::from_secs(self.max_poll_backoff_secs),
            auto_blocklist: self.auto_blocklist,
            auto_redownload: self.auto_redownload,
            max_import_attempts: self.max_import_attempts,
        }
    }
}

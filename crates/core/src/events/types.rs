use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indexer::TargetId;
use crate::tracked::TrackedState;

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Grabbed {
        download_id: Uuid,
        target_id: TargetId,
        title: String,
        source: String,
    },
    StateChanged {
        download_id: Uuid,
        target_id: TargetId,
        from: TrackedState,
        to: TrackedState,
        reason: Option<String>,
    },
    DownloadFailed {
        download_id: Uuid,
        target_id: TargetId,
        title: String,
        reason: String,
    },
    ImportSucceeded {
        download_id: Uuid,
        target_id: TargetId,
        title: String,
        files: Vec<PathBuf>,
    },
    ImportFailed {
        download_id: Uuid,
        target_id: TargetId,
        title: String,
        reason: String,
        retryable: bool,
    },
    Blocklisted {
        download_id: Uuid,
        target_id: TargetId,
        title: String,
        reason: String,
    },
    SourceHealthDegraded {
        source: String,
        consecutive_failures: u32,
        retry_in_secs: u64,
    },
    SourceHealthRestored {
        source: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Grabbed { .. } => "grabbed",
            Self::StateChanged { .. } => "state_changed",
            Self::DownloadFailed { .. } => "download_failed",
            Self::ImportSucceeded { .. } => "import_succeeded",
            Self::ImportFailed { .. } => "import_failed",
            Self::Blocklisted { .. } => "blocklisted",
            Self::SourceHealthDegraded { .. } => "source_health_degraded",
            Self::SourceHealthRestored { .. } => "source_health_restored",
        }
    }

    pub fn target_id(&self) -> Option<&TargetId> {
        match self {
            Self::Grabbed { target_id, .. }
            | Self::StateChanged { target_id, .. }
            | Self::DownloadFailed { target_id, .. }
            | Self::ImportSucceeded { target_id, .. }
            | Self::ImportFailed { target_id, .. }
            | Self::Blocklisted { target_id, .. } => Some(target_id),
            Self::SourceHealthDegraded { .. } | Self::SourceHealthRestored { .. } => None,
        }
    }
}

/// A notification with the time it was emitted.
#[derive(Debug, Clone)]
pub struct NotificationEnvelope {
    pub timestamp: DateTime<Utc>,
    pub notification: Notification,
}

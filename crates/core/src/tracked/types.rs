use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::decision::Decision;
use crate::download_client::{ClientDownloadId, ClientState, DownloadClientError};
use crate::import::ImportFailure;
use crate::indexer::TargetId;
use crate::store::StoreError;

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of a grabbed release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackedState {
    Queued,
    Downloading,
    Completed,
    Warning,
    Failed,
    Importing,
    Imported,
    ImportFailed,
    Removed,
    Blocklisted,
}

impl TrackedState {
    pub const ALL: [TrackedState; 10] = [
        TrackedState::Queued,
        TrackedState::Downloading,
        TrackedState::Completed,
        TrackedState::Warning,
        TrackedState::Failed,
        TrackedState::Importing,
        TrackedState::Imported,
        TrackedState::ImportFailed,
        TrackedState::Removed,
        TrackedState::Blocklisted,
    ];

    /// States the download client is still asked about.
    pub const POLLING: [TrackedState; 3] = [
        TrackedState::Queued,
        TrackedState::Downloading,
        TrackedState::Warning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedState::Queued => "queued",
            TrackedState::Downloading => "downloading",
            TrackedState::Completed => "completed",
            TrackedState::Warning => "warning",
            TrackedState::Failed => "failed",
            TrackedState::Importing => "importing",
            TrackedState::Imported => "imported",
            TrackedState::ImportFailed => "import_failed",
            TrackedState::Removed => "removed",
            TrackedState::Blocklisted => "blocklisted",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackedState::Imported | TrackedState::Removed | TrackedState::Blocklisted
        )
    }

    pub fn is_polling(&self) -> bool {
        Self::POLLING.contains(self)
    }

    /// Next state for a client report, or `None` when the report does not
    /// move this download.
    pub fn on_client_state(self, client: ClientState) -> Option<TrackedState> {
        if !self.is_polling() {
            return None;
        }
        let to = match client {
            // A client never moves a started download back to its queue.
            ClientState::Queued => return None,
            ClientState::Downloading => TrackedState::Downloading,
            ClientState::Warning => TrackedState::Warning,
            ClientState::Error => TrackedState::Failed,
            ClientState::Completed => TrackedState::Completed,
        };
        // A queued download reported done or stalled has started; the
        // manager records `Downloading` on the way.
        let reachable = transition(self, to).is_ok()
            || (self == TrackedState::Queued && transition(TrackedState::Downloading, to).is_ok());
        (to != self && reachable).then_some(to)
    }
}

impl fmt::Display for TrackedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single gate for state changes.
pub fn transition(from: TrackedState, to: TrackedState) -> Result<(), TrackedError> {
    use TrackedState::*;

    let allowed = match (from, to) {
        (Queued, Downloading) => true,
        // Lost, refused or broken before the client started it.
        (Queued, Failed) => true,
        (Downloading, Completed | Warning | Failed) => true,
        (Warning, Downloading | Completed | Failed) => true,
        (Completed, Importing) => true,
        (Importing, Imported | ImportFailed) => true,
        // Import interrupted by a restart.
        (Importing, Completed) => true,
        (ImportFailed, Importing) => true,
        (from, Removed | Blocklisted) => !from.is_terminal(),
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(TrackedError::InvalidTransition { from, to })
    }
}

// ============================================================================
// Tracked download
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TrackedState,
    pub to: TrackedState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A grabbed release followed from submission to import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDownload {
    pub id: Uuid,
    pub target_id: TargetId,
    /// Set once the client accepted the release.
    pub client_id: Option<ClientDownloadId>,
    pub state: TrackedState,
    pub decision: Decision,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
    /// Last reported progress, 0.0 - 1.0.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub poll_failures: u32,
    /// Skip polling until this time after a transient client error.
    pub next_poll_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub import_attempts: u32,
    pub last_import_failure: Option<ImportFailure>,
    #[serde(default)]
    pub imported_files: Vec<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedDownload {
    pub fn new(target_id: TargetId, decision: Decision, client_id: ClientDownloadId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_id,
            client_id: Some(client_id),
            state: TrackedState::Queued,
            decision,
            history: Vec::new(),
            progress: 0.0,
            poll_failures: 0,
            next_poll_at: None,
            import_attempts: 0,
            last_import_failure: None,
            imported_files: Vec::new(),
            output_path: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn title(&self) -> &str {
        &self.decision.release.title
    }

    /// Move to `to` if the transition table allows it, recording history.
    pub fn transition_to(
        &mut self,
        to: TrackedState,
        reason: Option<String>,
    ) -> Result<(), TrackedError> {
        transition(self.state, to)?;
        let now = Utc::now();
        self.history.push(TransitionRecord {
            from: self.state,
            to,
            at: now,
            reason,
        });
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the import sweep may retry this download on its own.
    pub fn can_auto_retry_import(&self, max_attempts: u32) -> bool {
        self.state == TrackedState::ImportFailed
            && self.import_attempts < max_attempts
            && self
                .last_import_failure
                .as_ref()
                .map(ImportFailure::is_retryable)
                .unwrap_or(false)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackedError {
    #[error("Tracked download not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TrackedState, to: TrackedState },

    #[error("Download client error: {0}")]
    Client(#[from] DownloadClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::indexer::{Protocol, ReleaseInfo};

    fn download() -> TrackedDownload {
        let release = ReleaseInfo::new("Movie.2020.1080p", "magnet:?x", "s1", Protocol::Torrent);
        TrackedDownload::new(
            TargetId::new("movie-1"),
            Decision::rejected(release, Vec::new()),
            ClientDownloadId::new("abc"),
        )
    }

    #[test]
    fn test_table_allows_happy_path() {
        use TrackedState::*;
        for (from, to) in [
            (Queued, Downloading),
            (Downloading, Completed),
            (Completed, Importing),
            (Importing, Imported),
        ] {
            assert!(transition(from, to).is_ok(), "{} -> {}", from, to);
        }
    }

    #[test]
    fn test_warning_clears() {
        assert!(transition(TrackedState::Warning, TrackedState::Downloading).is_ok());
        assert!(transition(TrackedState::Warning, TrackedState::Completed).is_ok());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in TrackedState::ALL.iter().filter(|s| s.is_terminal()) {
            for to in TrackedState::ALL {
                assert!(transition(*from, to).is_err(), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_failed_only_goes_to_blocklisted_or_removed() {
        for to in TrackedState::ALL {
            let ok = transition(TrackedState::Failed, to).is_ok();
            assert_eq!(
                ok,
                matches!(to, TrackedState::Blocklisted | TrackedState::Removed),
                "failed -> {}",
                to
            );
        }
    }

    #[test]
    fn test_skipping_import_is_rejected() {
        assert_eq!(
            transition(TrackedState::Completed, TrackedState::Imported),
            Err(TrackedError::InvalidTransition {
                from: TrackedState::Completed,
                to: TrackedState::Imported,
            })
        );
        assert!(transition(TrackedState::Downloading, TrackedState::Queued).is_err());
    }

    #[test]
    fn test_transition_to_records_history() {
        let mut d = download();
        d.transition_to(TrackedState::Downloading, None).unwrap();
        d.transition_to(TrackedState::Failed, Some("stalled".into()))
            .unwrap();

        assert_eq!(d.state, TrackedState::Failed);
        assert_eq!(d.history.len(), 2);
        assert_eq!(d.history[1].from, TrackedState::Downloading);
        assert_eq!(d.history[1].reason.as_deref(), Some("stalled"));

        let err = d.transition_to(TrackedState::Importing, None).unwrap_err();
        assert!(matches!(err, TrackedError::InvalidTransition { .. }));
        assert_eq!(d.history.len(), 2);
    }

    #[test]
    fn test_client_state_mapping() {
        use TrackedState::*;
        assert_eq!(Queued.on_client_state(ClientState::Queued), None);
        assert_eq!(
            Queued.on_client_state(ClientState::Downloading),
            Some(Downloading)
        );
        assert_eq!(Downloading.on_client_state(ClientState::Queued), None);
        assert_eq!(
            Downloading.on_client_state(ClientState::Error),
            Some(Failed)
        );
        assert_eq!(
            Warning.on_client_state(ClientState::Completed),
            Some(Completed)
        );
        assert_eq!(Completed.on_client_state(ClientState::Error), None);
    }

    #[test]
    fn test_auto_retry_only_for_retryable_failures() {
        let mut d = download();
        d.state = TrackedState::ImportFailed;
        d.import_attempts = 1;

        d.last_import_failure = Some(ImportFailure::NoMatchingFiles);
        assert!(!d.can_auto_retry_import(3));

        d.last_import_failure = Some(ImportFailure::DiskFull);
        assert!(d.can_auto_retry_import(3));

        d.import_attempts = 3;
        assert!(!d.can_auto_retry_import(3));
    }

    #[test]
    fn test_state_serializes_with_type_tag() {
        let json = serde_json::to_string(&TrackedState::ImportFailed).unwrap();
        assert_eq!(json, r#"{"type":"import_failed"}"#);
        let back: TrackedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TrackedState::ImportFailed);
    }

    /// State changes a download may make, written out independently of
    /// [`transition`].
    pub(crate) fn listed_edge(from: TrackedState, to: TrackedState) -> bool {
        use TrackedState::*;
        const EDGES: &[(TrackedState, TrackedState)] = &[
            (Queued, Downloading),
            (Queued, Failed),
            (Downloading, Completed),
            (Downloading, Warning),
            (Downloading, Failed),
            (Warning, Downloading),
            (Warning, Completed),
            (Warning, Failed),
            (Completed, Importing),
            (Importing, Imported),
            (Importing, ImportFailed),
            (Importing, Completed),
            (ImportFailed, Importing),
        ];
        let open = !matches!(from, Imported | Removed | Blocklisted);
        EDGES.contains(&(from, to)) || (open && matches!(to, Removed | Blocklisted))
    }

    #[test]
    fn test_table_is_exactly_the_listed_edges() {
        for from in TrackedState::ALL {
            for to in TrackedState::ALL {
                assert_eq!(
                    transition(from, to).is_ok(),
                    listed_edge(from, to),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_queued_reaches_completion_through_downloading() {
        use TrackedState::*;
        assert!(transition(Queued, Completed).is_err());
        assert!(transition(Queued, Warning).is_err());
        assert_eq!(Queued.on_client_state(ClientState::Completed), Some(Completed));
        assert_eq!(Queued.on_client_state(ClientState::Warning), Some(Warning));
        assert!(transition(Queued, Failed).is_ok());
    }

    #[test]
    fn test_interrupted_import_returns_to_completed() {
        assert!(transition(TrackedState::Importing, TrackedState::Completed).is_ok());
        assert!(transition(TrackedState::ImportFailed, TrackedState::Completed).is_err());
    }
}

//! Download client contract.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indexer::ReleaseInfo;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DownloadClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    /// The client answered but is temporarily unable to serve (5xx).
    #[error("Client unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Download not found: {0}")]
    NotFound(String),

    /// The client refused the release.
    #[error("Rejected by client: {0}")]
    Rejected(String),

    #[error("API error: {0}")]
    Api(String),
}

impl DownloadClientError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DownloadClientError::ConnectionFailed(_)
                | DownloadClientError::Timeout
                | DownloadClientError::Unavailable(_)
        )
    }
}

/// The client's own identifier for a submitted download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientDownloadId(pub String);

impl ClientDownloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientDownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Download state as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Queued,
    Downloading,
    /// Stalled, paused or otherwise needing attention; may recover.
    Warning,
    /// Permanently failed.
    Error,
    Completed,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Queued => "queued",
            ClientState::Downloading => "downloading",
            ClientState::Warning => "warning",
            ClientState::Error => "error",
            ClientState::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub state: ClientState,
    /// 0.0 - 1.0.
    pub progress: f64,
    /// Where the finished files are, once known.
    pub output_path: Option<PathBuf>,
    pub message: Option<String>,
}

impl ClientStatus {
    pub fn new(state: ClientState, progress: f64) -> Self {
        Self {
            state,
            progress,
            output_path: None,
            message: None,
        }
    }
}

/// A usenet or torrent download client.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    fn name(&self) -> &str;

    /// Hand a release to the client.
    async fn submit(&self, release: &ReleaseInfo) -> Result<ClientDownloadId, DownloadClientError>;

    async fn query_status(&self, id: &ClientDownloadId) -> Result<ClientStatus, DownloadClientError>;

    async fn remove(&self, id: &ClientDownloadId, delete_data: bool) -> Result<(), DownloadClientError>;
}

//! Types for the orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::Target;
use crate::indexer::{SearchCriteria, TargetId};
use crate::store::StoreError;
use crate::tracked::TrackedError;

/// Errors surfaced to pipeline callers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("target not wanted: {0}")]
    UnknownTarget(TargetId),

    #[error("acceptance profile not found: {0}")]
    UnknownProfile(String),

    /// Only accepted decisions can be grabbed.
    #[error("release was rejected: {0}")]
    NotAccepted(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracked(#[from] TrackedError),
}

/// A target the scheduler keeps looking for, with the criteria used to
/// search for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WantedTarget {
    pub target: Target,
    pub criteria: SearchCriteria,
}

/// Current status of the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub wanted: usize,
    pub queued: usize,
}

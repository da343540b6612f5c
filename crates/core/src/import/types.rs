use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::Decision;

/// Why an import did not place any files.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ImportFailure {
    #[error("No matching media files")]
    NoMatchingFiles,

    #[error("Only sample files found")]
    SampleOnly,

    #[error("Download contains no importable file types")]
    WrongFileType,

    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    #[error("Not enough free disk space")]
    DiskFull,

    #[error("I/O error: {0}")]
    Io(String),
}

impl ImportFailure {
    /// Whether another attempt could succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DiskFull | Self::Io(_))
    }

    /// Short machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoMatchingFiles => "no_matching_files",
            Self::SampleOnly => "sample_only",
            Self::WrongFileType => "wrong_file_type",
            Self::AlreadyExists(_) => "already_exists",
            Self::DiskFull => "disk_full",
            Self::Io(_) => "io",
        }
    }

    pub(crate) fn from_io(error: &std::io::Error, path: &Path) -> Self {
        // ENOSPC is 28 on Linux
        if error.kind() == std::io::ErrorKind::StorageFull || error.raw_os_error() == Some(28) {
            Self::DiskFull
        } else if error.kind() == std::io::ErrorKind::AlreadyExists {
            Self::AlreadyExists(path.display().to_string())
        } else {
            Self::Io(format!("{}: {}", path.display(), error))
        }
    }
}

/// Result of one import attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(Vec<PathBuf>),
    Failed(ImportFailure),
}

impl ImportOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, Self::Imported(_))
    }
}

/// Moves a finished download into the library.
#[async_trait]
pub trait Importer: Send + Sync {
    fn name(&self) -> &str;

    /// Import whatever `path` holds for the release behind `decision`.
    async fn import(&self, decision: &Decision, path: &Path) -> ImportOutcome;
}

//! Filesystem importer: copies or moves finished downloads into a library
//! directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use super::types::{ImportFailure, ImportOutcome, Importer};
use crate::decision::Decision;

const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "ts", "m2ts", "webm", "mpg", "mpeg",
];

/// Files smaller than this with "sample" in the name are treated as samples.
const SAMPLE_MAX_BYTES: u64 = 300 * 1024 * 1024;

/// Importer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Root directory imported files are placed under.
    pub library_root: PathBuf,

    /// Lowercase extensions considered media.
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    /// Leave the download in place (torrents keep seeding).
    #[serde(default = "default_keep_source")]
    pub keep_source: bool,
}

fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_keep_source() -> bool {
    true
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            library_root: PathBuf::from("./library"),
            media_extensions: default_media_extensions(),
            keep_source: default_keep_source(),
        }
    }
}

/// A file found under the download output path.
#[derive(Debug, Clone)]
struct FoundFile {
    path: PathBuf,
    size: u64,
}

/// Places media files at `{library_root}/{Title (Year)}/{file name}`.
pub struct FileSystemImporter {
    config: ImportConfig,
}

impl FileSystemImporter {
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Library folder for a release.
    pub fn destination_dir(&self, decision: &Decision) -> PathBuf {
        let parsed = &decision.release.parsed;
        let base = if parsed.title.is_empty() {
            decision.release.title.clone()
        } else {
            match parsed.year {
                Some(year) => format!("{} ({})", parsed.title, year),
                None => parsed.title.clone(),
            }
        };
        self.config.library_root.join(sanitize_component(&base))
    }

    fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.config.media_extensions.iter().any(|m| *m == e)
            })
            .unwrap_or(false)
    }

    /// Attempts to move a file atomically (rename).
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // Cross-filesystem moves fail with EXDEV (18 on Linux)
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn place(&self, source: &Path, destination: &Path) -> Result<(), ImportFailure> {
        // Two files of the same name in one download must not clobber each other.
        if fs::try_exists(destination).await.unwrap_or(false) {
            return Err(ImportFailure::AlreadyExists(destination.display().to_string()));
        }

        if !self.config.keep_source {
            let moved = Self::try_atomic_move(source, destination)
                .await
                .map_err(|e| ImportFailure::from_io(&e, destination))?;
            if moved {
                return Ok(());
            }
        }

        fs::copy(source, destination)
            .await
            .map_err(|e| ImportFailure::from_io(&e, destination))?;

        if !self.config.keep_source {
            if let Err(e) = fs::remove_file(source).await {
                warn!(path = %source.display(), error = %e, "Failed to remove source after copy");
            }
        }
        Ok(())
    }

    /// Undo the placements of a failed import, newest first: copies are
    /// deleted, moved files go back to where the download left them.
    async fn roll_back(&self, placed: &[(PathBuf, PathBuf)], dest_dir: &Path) {
        for (source, destination) in placed.iter().rev() {
            let result = if self.config.keep_source {
                fs::remove_file(destination).await
            } else {
                Self::restore(destination, source).await
            };
            match result {
                Ok(()) => debug!(path = %destination.display(), "Rolled back imported file"),
                Err(e) => warn!(
                    path = %destination.display(),
                    error = %e,
                    "Failed to roll back imported file"
                ),
            }
        }
        // Only succeeds when nothing else lives there.
        if fs::remove_dir(dest_dir).await.is_ok() {
            debug!(path = %dest_dir.display(), "Removed empty library folder");
        }
    }

    async fn restore(destination: &Path, source: &Path) -> std::io::Result<()> {
        if let Some(parent) = source.parent() {
            fs::create_dir_all(parent).await?;
        }
        if Self::try_atomic_move(destination, source).await? {
            return Ok(());
        }
        fs::copy(destination, source).await?;
        fs::remove_file(destination).await
    }
}

/// Every regular file at or below `root`.
async fn collect_files(root: &Path) -> std::io::Result<Vec<FoundFile>> {
    let meta = fs::metadata(root).await?;
    if meta.is_file() {
        return Ok(vec![FoundFile {
            path: root.to_path_buf(),
            size: meta.len(),
        }]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                files.push(FoundFile {
                    path: entry.path(),
                    size: meta.len(),
                });
            }
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_sample(file: &FoundFile) -> bool {
    let in_sample_dir = file
        .path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(|n| n.eq_ignore_ascii_case("sample"))
        .unwrap_or(false);

    let named_sample = file
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| {
            s.to_ascii_lowercase()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| token == "sample")
        })
        .unwrap_or(false);

    in_sample_dir || (named_sample && file.size < SAMPLE_MAX_BYTES)
}

fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Importer for FileSystemImporter {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn import(&self, decision: &Decision, path: &Path) -> ImportOutcome {
        let files = match collect_files(path).await {
            Ok(files) => files,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Download output path does not exist");
                return ImportOutcome::Failed(ImportFailure::NoMatchingFiles);
            }
            Err(e) => return ImportOutcome::Failed(ImportFailure::from_io(&e, path)),
        };

        if files.is_empty() {
            return ImportOutcome::Failed(ImportFailure::NoMatchingFiles);
        }

        let media: Vec<&FoundFile> = files.iter().filter(|f| self.is_media(&f.path)).collect();
        if media.is_empty() {
            return ImportOutcome::Failed(ImportFailure::WrongFileType);
        }

        let wanted: Vec<&FoundFile> = media.into_iter().filter(|f| !is_sample(f)).collect();
        if wanted.is_empty() {
            return ImportOutcome::Failed(ImportFailure::SampleOnly);
        }

        let dest_dir = self.destination_dir(decision);
        let mut planned = Vec::with_capacity(wanted.len());
        for file in &wanted {
            let Some(file_name) = file.path.file_name() else {
                continue;
            };
            let destination = dest_dir.join(file_name);
            if fs::try_exists(&destination).await.unwrap_or(false) {
                return ImportOutcome::Failed(ImportFailure::AlreadyExists(
                    destination.display().to_string(),
                ));
            }
            planned.push((file.path.clone(), destination));
        }

        if let Err(e) = fs::create_dir_all(&dest_dir).await {
            return ImportOutcome::Failed(ImportFailure::from_io(&e, &dest_dir));
        }

        let mut placed: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(planned.len());
        for (source, destination) in planned {
            if let Err(failure) = self.place(&source, &destination).await {
                warn!(
                    source = %source.display(),
                    destination = %destination.display(),
                    error = %failure,
                    rolled_back = placed.len(),
                    "Import failed"
                );
                self.roll_back(&placed, &dest_dir).await;
                return ImportOutcome::Failed(failure);
            }
            placed.push((source, destination));
        }
        let placed: Vec<PathBuf> = placed.into_iter().map(|(_, d)| d).collect();

        info!(
            title = %decision.release.title,
            files = placed.len(),
            destination = %dest_dir.display(),
            "Imported download"
        );
        ImportOutcome::Imported(placed)
    }
}

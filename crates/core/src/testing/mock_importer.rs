//! Mock importer for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::decision::Decision;
use crate::import::{ImportOutcome, Importer};

/// A recorded import call.
#[derive(Debug, Clone)]
pub struct RecordedImport {
    pub title: String,
    pub path: PathBuf,
}

/// Mock implementation of the Importer trait.
///
/// Queued outcomes are returned first, in order. Once the queue is empty
/// every import succeeds with a single file under the given path.
#[derive(Debug)]
pub struct MockImporter {
    outcomes: Arc<RwLock<VecDeque<ImportOutcome>>>,
    calls: Arc<RwLock<Vec<RecordedImport>>>,
}

impl Default for MockImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImporter {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(VecDeque::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn push_outcome(&self, outcome: ImportOutcome) {
        self.outcomes.write().await.push_back(outcome);
    }

    pub async fn calls(&self) -> Vec<RecordedImport> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl Importer for MockImporter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn import(&self, decision: &Decision, path: &Path) -> ImportOutcome {
        self.calls.write().await.push(RecordedImport {
            title: decision.release.title.clone(),
            path: path.to_path_buf(),
        });

        self.outcomes
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| ImportOutcome::Imported(vec![path.join("imported.mkv")]))
    }
}

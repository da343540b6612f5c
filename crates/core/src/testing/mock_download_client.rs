//! Mock download client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, Semaphore};

use crate::download_client::{
    ClientDownloadId, ClientState, ClientStatus, DownloadClient, DownloadClientError,
};
use crate::indexer::ReleaseInfo;

/// A recorded submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub id: ClientDownloadId,
    pub release: ReleaseInfo,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the DownloadClient trait.
///
/// Every submitted release starts `Queued`. Tests drive it forward with
/// [`set_state`](Self::set_state), [`complete`](Self::complete) or
/// [`fail_status`](Self::fail_status).
///
/// # Example
///
/// ```rust,ignore
/// let client = MockDownloadClient::new();
/// let id = client.submit(&release).await?;
///
/// client.set_state(&id, ClientState::Downloading).await;
/// client.complete(&id, "/downloads/movie").await;
/// ```
#[derive(Debug)]
pub struct MockDownloadClient {
    submitted: Arc<RwLock<Vec<RecordedSubmission>>>,
    statuses: Arc<RwLock<HashMap<ClientDownloadId, Result<ClientStatus, DownloadClientError>>>>,
    removed: Arc<RwLock<Vec<(ClientDownloadId, bool)>>>,
    /// If set, the next submit fails with this error.
    next_submit_error: Arc<RwLock<Option<DownloadClientError>>>,
    counter: Arc<RwLock<u32>>,
    /// When set, status queries wait for a permit before answering.
    status_gate: Arc<RwLock<Option<Arc<Semaphore>>>>,
    status_queried: Arc<Notify>,
}

impl Default for MockDownloadClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(RwLock::new(Vec::new())),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
            next_submit_error: Arc::new(RwLock::new(None)),
            counter: Arc::new(RwLock::new(0)),
            status_gate: Arc::new(RwLock::new(None)),
            status_queried: Arc::new(Notify::new()),
        }
    }

    pub async fn submitted(&self) -> Vec<RecordedSubmission> {
        self.submitted.read().await.clone()
    }

    pub async fn removed(&self) -> Vec<(ClientDownloadId, bool)> {
        self.removed.read().await.clone()
    }

    pub async fn fail_next_submit(&self, error: DownloadClientError) {
        *self.next_submit_error.write().await = Some(error);
    }

    pub async fn set_status(&self, id: &ClientDownloadId, status: ClientStatus) {
        self.statuses.write().await.insert(id.clone(), Ok(status));
    }

    pub async fn set_state(&self, id: &ClientDownloadId, state: ClientState) {
        let progress = if state == ClientState::Completed { 1.0 } else { 0.5 };
        self.set_status(id, ClientStatus::new(state, progress)).await;
    }

    /// Report the download finished with its files at `output_path`.
    pub async fn complete(&self, id: &ClientDownloadId, output_path: impl Into<PathBuf>) {
        let mut status = ClientStatus::new(ClientState::Completed, 1.0);
        status.output_path = Some(output_path.into());
        self.set_status(id, status).await;
    }

    /// Report a permanent client-side error.
    pub async fn error(&self, id: &ClientDownloadId, message: &str) {
        let mut status = ClientStatus::new(ClientState::Error, 0.3);
        status.message = Some(message.to_string());
        self.set_status(id, status).await;
    }

    /// Hold every status query until a permit is added to the returned
    /// semaphore, one permit per query.
    pub async fn hold_status_queries(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.status_gate.write().await = Some(Arc::clone(&gate));
        gate
    }

    /// Wait until a status query has reached the client.
    pub async fn wait_for_status_query(&self) {
        self.status_queried.notified().await;
    }

    /// Make status queries for `id` fail with `error`.
    pub async fn fail_status(&self, id: &ClientDownloadId, error: DownloadClientError) {
        self.statuses.write().await.insert(id.clone(), Err(error));
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, release: &ReleaseInfo) -> Result<ClientDownloadId, DownloadClientError> {
        if let Some(error) = self.next_submit_error.write().await.take() {
            return Err(error);
        }

        let id = {
            let mut counter = self.counter.write().await;
            *counter += 1;
            match &release.info_hash {
                Some(hash) => ClientDownloadId::new(hash.clone()),
                None => ClientDownloadId::new(format!("mock-{}", *counter)),
            }
        };

        self.statuses
            .write()
            .await
            .insert(id.clone(), Ok(ClientStatus::new(ClientState::Queued, 0.0)));
        self.submitted.write().await.push(RecordedSubmission {
            id: id.clone(),
            release: release.clone(),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn query_status(&self, id: &ClientDownloadId) -> Result<ClientStatus, DownloadClientError> {
        self.status_queried.notify_one();
        let gate = self.status_gate.read().await.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.statuses
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| Err(DownloadClientError::NotFound(id.to_string())))
    }

    async fn remove(&self, id: &ClientDownloadId, delete_data: bool) -> Result<(), DownloadClientError> {
        self.removed.write().await.push((id.clone(), delete_data));
        match self.statuses.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(DownloadClientError::NotFound(id.to_string())),
        }
    }
}

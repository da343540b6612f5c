use uuid::Uuid;

use super::{TrackedDownload, TrackedState};
use crate::indexer::TargetId;
use crate::store::StoreError;

/// Storage for tracked downloads.
pub trait TrackedDownloadStore: Send + Sync {
    fn insert(&self, download: &TrackedDownload) -> Result<(), StoreError>;

    /// Overwrite the stored record. Returns false if it does not exist.
    fn update(&self, download: &TrackedDownload) -> Result<bool, StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>, StoreError>;

    /// Every download, oldest first.
    fn list(&self) -> Result<Vec<TrackedDownload>, StoreError>;

    /// Downloads currently in any of `states`, oldest first.
    fn in_states(&self, states: &[TrackedState]) -> Result<Vec<TrackedDownload>, StoreError>;

    fn for_target(&self, target_id: &TargetId) -> Result<Vec<TrackedDownload>, StoreError>;

    /// Downloads of the release with this source guid.
    fn for_release(&self, guid: &str) -> Result<Vec<TrackedDownload>, StoreError>;

    /// Returns true if a record was deleted.
    fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

use uuid::Uuid;

use super::BlocklistEntry;
use crate::indexer::TargetId;
use crate::store::StoreError;

/// Storage for blocklisted releases.
pub trait BlocklistStore: Send + Sync {
    fn insert(&self, entry: &BlocklistEntry) -> Result<(), StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<BlocklistEntry>, StoreError>;

    /// Entries for one target, oldest first.
    fn for_target(&self, target_id: &TargetId) -> Result<Vec<BlocklistEntry>, StoreError>;

    /// Every entry, newest first.
    fn list(&self) -> Result<Vec<BlocklistEntry>, StoreError>;

    /// Returns true if an entry was deleted.
    fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Returns the number of entries deleted.
    fn delete_for_target(&self, target_id: &TargetId) -> Result<usize, StoreError>;
}

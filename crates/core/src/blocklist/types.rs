use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indexer::{Protocol, ReleaseInfo, TargetId};

/// Publish dates within this window are considered the same upload.
const PUBLISH_DATE_TOLERANCE_SECS: i64 = 60;

/// Sizes within this many bytes are considered the same upload.
const SIZE_TOLERANCE_BYTES: u64 = 2 * 1024 * 1024;

/// A release that must not be grabbed again for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub id: Uuid,
    pub target_id: TargetId,
    pub source_title: String,
    pub source_name: String,
    pub protocol: Protocol,
    pub info_hash: Option<String>,
    /// Size in bytes; 0 when unknown.
    pub size: u64,
    pub publish_date: Option<DateTime<Utc>>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl BlocklistEntry {
    /// Entry for `release`, blocked for `target_id`.
    pub fn for_release(
        target_id: TargetId,
        release: &ReleaseInfo,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id,
            source_title: release.title.clone(),
            source_name: release.source_name.clone(),
            protocol: release.protocol,
            info_hash: release.info_hash.clone(),
            size: release.size,
            publish_date: release.publish_date,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether `release` is the upload this entry blocks.
    ///
    /// Torrents compare by info hash when both sides carry one. Everything
    /// else compares by title, publish date and size.
    pub fn matches(&self, release: &ReleaseInfo) -> bool {
        if self.protocol != release.protocol {
            return false;
        }

        if let (Some(ours), Some(theirs)) = (&self.info_hash, &release.info_hash) {
            if self.protocol == Protocol::Torrent {
                return ours.eq_ignore_ascii_case(theirs);
            }
        }

        self.source_title.eq_ignore_ascii_case(&release.title)
            && self.same_publish_date(release.publish_date)
            && self.same_size(release.size)
    }

    fn same_publish_date(&self, other: Option<DateTime<Utc>>) -> bool {
        match (self.publish_date, other) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(ours), Some(theirs)) => {
                (ours - theirs).abs() <= Duration::seconds(PUBLISH_DATE_TOLERANCE_SECS)
            }
        }
    }

    fn same_size(&self, other: u64) -> bool {
        self.size == 0 || self.size.abs_diff(other) <= SIZE_TOLERANCE_BYTES
    }
}

//! Ordering of accepted decisions.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::types::DecisionScore;

/// One comparison step of the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingKey {
    /// Position in the profile's allowed qualities.
    Quality,
    CustomFormatScore,
    /// Real (proper) count, then version.
    Revision,
    PreferredTerms,
    IndexerFlags,
    Protocol,
    /// Seeders, then peers. Only compared when both releases are torrents.
    Seeders,
    /// Newer first. Only compared when both releases are usenet.
    Age,
    /// Larger first.
    Size,
}

/// Ordered comparison steps (`[ranking]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_order")]
    pub order: Vec<RankingKey>,
}

fn default_order() -> Vec<RankingKey> {
    vec![
        RankingKey::Quality,
        RankingKey::CustomFormatScore,
        RankingKey::Revision,
        RankingKey::PreferredTerms,
        RankingKey::IndexerFlags,
        RankingKey::Protocol,
        RankingKey::Seeders,
        RankingKey::Age,
        RankingKey::Size,
    ]
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
        }
    }
}

impl RankingConfig {
    /// Compare two scores; `Less` means `a` ranks first.
    pub fn compare(&self, a: &DecisionScore, b: &DecisionScore) -> Ordering {
        self.order
            .iter()
            .map(|key| compare_key(*key, a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

fn compare_key(key: RankingKey, a: &DecisionScore, b: &DecisionScore) -> Ordering {
    match key {
        RankingKey::Quality => b.quality_weight.cmp(&a.quality_weight),
        RankingKey::CustomFormatScore => b.custom_format_score.cmp(&a.custom_format_score),
        RankingKey::Revision => b.revision.cmp(&a.revision),
        RankingKey::PreferredTerms => b.preferred_term_score.cmp(&a.preferred_term_score),
        RankingKey::IndexerFlags => b.indexer_flags.cmp(&a.indexer_flags),
        RankingKey::Protocol => b.preferred_protocol.cmp(&a.preferred_protocol),
        RankingKey::Seeders => match (a.torrent, b.torrent) {
            (Some(a), Some(b)) => (b.seeders_bucket, b.peers_bucket)
                .cmp(&(a.seeders_bucket, a.peers_bucket)),
            _ => Ordering::Equal,
        },
        RankingKey::Age => match (a.usenet_age_bucket, b.usenet_age_bucket) {
            (Some(a), Some(b)) => b.cmp(&a),
            _ => Ordering::Equal,
        },
        RankingKey::Size => b.size_bucket.cmp(&a.size_bucket),
    }
}

/// `round(log10(count))`, with zero and one in the same bucket.
pub fn log10_bucket(count: u32) -> u32 {
    (count.max(1) as f64).log10().round() as u32
}

/// Coarse age step for usenet posts: the last hour, day and week each beat
/// everything older.
pub fn usenet_age_bucket(age_minutes: i64) -> u32 {
    match age_minutes {
        m if m < 60 => 1000,
        m if m <= 24 * 60 => 100,
        m if m <= 7 * 24 * 60 => 10,
        _ => 1,
    }
}

const SIZE_STEP_BYTES: u64 = 200 * 1024 * 1024;

/// Size rounded to the nearest 200 MB step.
pub fn size_bucket(size: u64) -> u64 {
    (size + SIZE_STEP_BYTES / 2) / SIZE_STEP_BYTES
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::custom_format::CustomFormat;
use super::ranking::RankingConfig;
use crate::blocklist::BlocklistEntry;
use crate::indexer::{Protocol, TargetId};
use crate::parser::{Language, Quality, QualityModel};

/// User-defined rules for which releases are acceptable for a target and
/// how they rank (`[[profiles]]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceProfile {
    pub id: String,
    pub name: String,
    /// Allowed qualities, worst first. The index is the quality weight.
    pub qualities: Vec<Quality>,
    /// Once the held file reaches this quality, stop upgrading.
    pub cutoff: Quality,
    #[serde(default = "default_true")]
    pub upgrades_allowed: bool,
    /// Empty means any language.
    #[serde(default)]
    pub languages: Vec<Language>,
    /// Custom format name to score.
    #[serde(default)]
    pub format_scores: BTreeMap<String, i32>,
    #[serde(default)]
    pub min_format_score: i32,
    #[serde(default)]
    pub cutoff_format_score: i32,
    #[serde(default)]
    pub min_size_mb: Option<u64>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
    /// Torrents only.
    #[serde(default)]
    pub min_seeders: Option<u32>,
    /// Usenet only.
    #[serde(default)]
    pub max_age_days: Option<u32>,
    /// Plain substrings or `/regex/`, matched case-insensitively.
    #[serde(default)]
    pub required_terms: Vec<String>,
    #[serde(default)]
    pub forbidden_terms: Vec<String>,
    #[serde(default)]
    pub preferred_terms: BTreeMap<String, i32>,
    #[serde(default = "default_protocols")]
    pub allowed_protocols: Vec<Protocol>,
    #[serde(default)]
    pub preferred_protocol: Option<Protocol>,
    /// Overrides the global ranking order.
    #[serde(default)]
    pub ranking: Option<RankingConfig>,
}

fn default_true() -> bool {
    true
}

fn default_protocols() -> Vec<Protocol> {
    vec![Protocol::Usenet, Protocol::Torrent]
}

impl AcceptanceProfile {
    /// A profile allowing `qualities` with every other rule relaxed.
    pub fn new(id: impl Into<String>, qualities: Vec<Quality>) -> Self {
        let cutoff = qualities.last().copied().unwrap_or_default();
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            qualities,
            cutoff,
            upgrades_allowed: true,
            languages: Vec::new(),
            format_scores: BTreeMap::new(),
            min_format_score: 0,
            cutoff_format_score: 0,
            min_size_mb: None,
            max_size_mb: None,
            min_seeders: None,
            max_age_days: None,
            required_terms: Vec::new(),
            forbidden_terms: Vec::new(),
            preferred_terms: BTreeMap::new(),
            allowed_protocols: default_protocols(),
            preferred_protocol: None,
            ranking: None,
        }
    }

    /// Weight of `quality`, or `None` if the profile does not allow it.
    pub fn quality_weight(&self, quality: Quality) -> Option<i32> {
        self.qualities
            .iter()
            .position(|q| *q == quality)
            .map(|i| i as i32)
    }

    pub fn format_score(&self, format_names: &[String]) -> i32 {
        format_names
            .iter()
            .filter_map(|name| self.format_scores.get(name))
            .sum()
    }
}

/// The file a target currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldFile {
    pub quality: QualityModel,
    #[serde(default)]
    pub custom_format_score: i32,
}

/// What a search is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    /// Acceptance profile id.
    pub profile_id: String,
    #[serde(default)]
    pub current: Option<HeldFile>,
    /// Search even though the cutoff is met.
    #[serde(default)]
    pub force: bool,
    /// Scales the per-quality size limits.
    #[serde(default)]
    pub runtime_minutes: Option<u32>,
}

impl Target {
    pub fn new(id: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            id: TargetId::new(id),
            profile_id: profile_id.into(),
            current: None,
            force: false,
            runtime_minutes: None,
        }
    }

    pub fn with_runtime(mut self, minutes: u32) -> Self {
        self.runtime_minutes = Some(minutes);
        self
    }

    pub fn holding(mut self, quality: QualityModel, custom_format_score: i32) -> Self {
        self.current = Some(HeldFile {
            quality,
            custom_format_score,
        });
        self
    }
}

/// Snapshot of everything besides the release, target and profile that
/// evaluation depends on.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Blocklist entries for the target.
    pub blocklist: Vec<BlocklistEntry>,
    pub custom_formats: Vec<CustomFormat>,
    /// Category hints from the search criteria.
    pub categories: Vec<u32>,
    /// Reference time for age checks.
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            blocklist: Vec::new(),
            custom_formats: Vec::new(),
            categories: Vec::new(),
            now,
        }
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

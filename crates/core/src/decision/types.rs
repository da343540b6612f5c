use std::fmt;

use serde::{Deserialize, Serialize};

use crate::indexer::{Protocol, ReleaseInfo};
use crate::parser::{Quality, Revision};

/// Why a release was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rejection {
    Blocklisted,
    ProtocolNotAllowed { protocol: Protocol },
    CategoryNotAllowed,
    MissingRequiredTerm { term: String },
    ContainsForbiddenTerm { term: String },
    HashedRelease,
    LanguageNotAllowed,
    QualityNotAllowed { quality: Quality },
    NotAnUpgrade,
    UpgradesDisabled,
    CutoffMet,
    CustomFormatScoreBelowMinimum { score: i32, minimum: i32 },
    SizeTooSmall { size_mb: u64, minimum_mb: u64 },
    SizeTooLarge { size_mb: u64, maximum_mb: u64 },
    InsufficientSeeders { seeders: u32, minimum: u32 },
    TooOld { age_days: i64, maximum_days: u32 },
}

impl Rejection {
    /// Stable label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Blocklisted => "blocklisted",
            Rejection::ProtocolNotAllowed { .. } => "protocol_not_allowed",
            Rejection::CategoryNotAllowed => "category_not_allowed",
            Rejection::MissingRequiredTerm { .. } => "missing_required_term",
            Rejection::ContainsForbiddenTerm { .. } => "contains_forbidden_term",
            Rejection::HashedRelease => "hashed_release",
            Rejection::LanguageNotAllowed => "language_not_allowed",
            Rejection::QualityNotAllowed { .. } => "quality_not_allowed",
            Rejection::NotAnUpgrade => "not_an_upgrade",
            Rejection::UpgradesDisabled => "upgrades_disabled",
            Rejection::CutoffMet => "cutoff_met",
            Rejection::CustomFormatScoreBelowMinimum { .. } => "custom_format_score_below_minimum",
            Rejection::SizeTooSmall { .. } => "size_too_small",
            Rejection::SizeTooLarge { .. } => "size_too_large",
            Rejection::InsufficientSeeders { .. } => "insufficient_seeders",
            Rejection::TooOld { .. } => "too_old",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Blocklisted => write!(f, "Release is blocklisted"),
            Rejection::ProtocolNotAllowed { protocol } => {
                write!(f, "{} releases are not allowed", protocol)
            }
            Rejection::CategoryNotAllowed => write!(f, "Release category does not match"),
            Rejection::MissingRequiredTerm { term } => {
                write!(f, "Does not contain required term: {}", term)
            }
            Rejection::ContainsForbiddenTerm { term } => {
                write!(f, "Contains forbidden term: {}", term)
            }
            Rejection::HashedRelease => write!(f, "Release name is an obfuscated hash"),
            Rejection::LanguageNotAllowed => write!(f, "Language is not wanted"),
            Rejection::QualityNotAllowed { quality } => {
                write!(f, "Quality {} is not wanted", quality)
            }
            Rejection::NotAnUpgrade => write!(f, "Not an upgrade for the existing file"),
            Rejection::UpgradesDisabled => write!(f, "Upgrades are disabled"),
            Rejection::CutoffMet => write!(f, "Existing file meets the cutoff"),
            Rejection::CustomFormatScoreBelowMinimum { score, minimum } => write!(
                f,
                "Custom format score {} is below the minimum of {}",
                score, minimum
            ),
            Rejection::SizeTooSmall {
                size_mb,
                minimum_mb,
            } => write!(f, "{} MB is smaller than the minimum {} MB", size_mb, minimum_mb),
            Rejection::SizeTooLarge {
                size_mb,
                maximum_mb,
            } => write!(f, "{} MB is larger than the maximum {} MB", size_mb, maximum_mb),
            Rejection::InsufficientSeeders { seeders, minimum } => {
                write!(f, "{} seeders, at least {} required", seeders, minimum)
            }
            Rejection::TooOld {
                age_days,
                maximum_days,
            } => write!(f, "{} days old, maximum is {}", age_days, maximum_days),
        }
    }
}

/// Ranking inputs for an accepted release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionScore {
    /// Position of the quality in the profile's allowed list.
    pub quality_weight: i32,
    pub revision: Revision,
    pub custom_format_score: i32,
    pub preferred_term_score: i32,
    /// Release uses the profile's preferred protocol.
    pub preferred_protocol: bool,
    pub indexer_flags: u8,
    /// Swarm size; torrents only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torrent: Option<TorrentScore>,
    /// Higher is newer; usenet only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usenet_age_bucket: Option<u32>,
    /// Size rounded to 200 MB steps.
    pub size_bucket: u64,
}

/// `round(log10(n))` of a torrent's seeders and peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TorrentScore {
    pub seeders_bucket: u32,
    pub peers_bucket: u32,
}

/// The verdict for one release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub release: ReleaseInfo,
    pub accepted: bool,
    /// Every failed check, in evaluation order. Empty when accepted.
    #[serde(default)]
    pub rejections: Vec<Rejection>,
    /// Present for accepted releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<DecisionScore>,
}

impl Decision {
    pub fn accepted(release: ReleaseInfo, score: DecisionScore) -> Self {
        Self {
            release,
            accepted: true,
            rejections: Vec::new(),
            score: Some(score),
        }
    }

    pub fn rejected(release: ReleaseInfo, rejections: Vec<Rejection>) -> Self {
        Self {
            release,
            accepted: false,
            rejections,
            score: None,
        }
    }

    pub fn first_rejection(&self) -> Option<&Rejection> {
        self.rejections.first()
    }
}

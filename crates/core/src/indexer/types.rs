//! Types shared by content sources, request chains and the aggregator.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::{self, Language, ParsedInfo, QualityModel};

// ============================================================================
// Identifiers
// ============================================================================

/// Reference to the media entity a search or download is for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transfer protocol of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Usenet,
    Torrent,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Usenet => write!(f, "usenet"),
            Protocol::Torrent => write!(f, "torrent"),
        }
    }
}

// ============================================================================
// Releases
// ============================================================================

/// Tracker-side flags attached to a release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerFlags {
    pub freeleech: bool,
    pub halfleech: bool,
    pub double_upload: bool,
    pub internal: bool,
    pub scene: bool,
}

impl IndexerFlags {
    /// Preference weight used when ranking. Freeleech, double upload and
    /// internal count two each, halfleech one.
    pub fn weight(&self) -> u8 {
        let mut weight = 0;
        if self.freeleech {
            weight += 2;
        }
        if self.double_upload {
            weight += 2;
        }
        if self.internal {
            weight += 2;
        }
        if self.halfleech {
            weight += 1;
        }
        weight
    }
}

/// A candidate release reported by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Source-unique identifier (guid).
    pub guid: String,
    pub title: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    /// URL or magnet link handed to the download client.
    pub download_url: String,
    /// Lowercase hex info hash (torrents only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    /// Name of the source that returned this release.
    pub source_name: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<u32>,
    #[serde(default)]
    pub indexer_flags: IndexerFlags,
    #[serde(default)]
    pub languages: BTreeSet<Language>,
    #[serde(default)]
    pub quality: QualityModel,
    /// Names of matched custom formats.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_formats: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<u32>,
    /// External ids such as `imdb:tt0111161`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_ids: Vec<String>,
    /// Full title parse, filled in by [`ReleaseInfo::with_parsed`].
    #[serde(default)]
    pub parsed: ParsedInfo,
}

impl ReleaseInfo {
    /// Bare release with only the required fields set.
    pub fn new(
        title: impl Into<String>,
        download_url: impl Into<String>,
        source_name: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        let download_url = download_url.into();
        Self {
            guid: download_url.clone(),
            title: title.into(),
            size: 0,
            publish_date: None,
            download_url,
            info_hash: None,
            source_name: source_name.into(),
            protocol,
            seeders: None,
            peers: None,
            indexer_flags: IndexerFlags::default(),
            languages: BTreeSet::new(),
            quality: QualityModel::default(),
            custom_formats: Vec::new(),
            categories: Vec::new(),
            external_ids: Vec::new(),
            parsed: ParsedInfo::default(),
        }
    }

    /// Run the title through the parser and copy quality and languages
    /// onto the release.
    pub fn with_parsed(mut self) -> Self {
        let parsed = parser::parse_title(&self.title);
        self.quality = parsed.quality;
        self.languages.extend(parsed.languages.iter().copied());
        self.parsed = parsed;
        self
    }

    /// Identity used to merge the same release reported by several sources.
    pub fn dedup_key(&self) -> (String, u64, Protocol) {
        (parser::normalize_title(&self.title), self.size, self.protocol)
    }

    /// Whole days since publication, if the publish date is known.
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.publish_date
            .map(|published| (now - published).num_days().max(0))
    }

    /// Number of optional metadata fields populated. Used to pick the
    /// richest duplicate.
    pub fn completeness(&self) -> usize {
        [
            self.publish_date.is_some(),
            self.info_hash.is_some(),
            self.seeders.is_some(),
            self.peers.is_some(),
            !self.categories.is_empty(),
            !self.external_ids.is_empty(),
            self.indexer_flags != IndexerFlags::default(),
        ]
        .iter()
        .filter(|populated| **populated)
        .count()
    }
}

// ============================================================================
// Search criteria
// ============================================================================

/// What to search for. Immutable for the duration of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub target_id: TargetId,
    pub terms: String,
    #[serde(default)]
    pub categories: Vec<u32>,
    /// `scheme:value`, e.g. `imdb:tt0111161` or `tvdb:81189`.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    /// Search even if the target already meets its cutoff.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub user_initiated: bool,
}

impl SearchCriteria {
    pub fn new(target_id: impl Into<String>, terms: impl Into<String>) -> Self {
        Self {
            target_id: TargetId::new(target_id),
            terms: terms.into(),
            ..Default::default()
        }
    }

    /// Split the external id into `(scheme, value)`.
    pub fn external_id_parts(&self) -> Option<(&str, &str)> {
        self.external_id
            .as_deref()
            .and_then(|id| id.split_once(':'))
            .filter(|(scheme, value)| !scheme.is_empty() && !value.is_empty())
    }
}

// ============================================================================
// Source definitions
// ============================================================================

/// Implementation family of a configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Torznab,
    Newznab,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Torznab => write!(f, "torznab"),
            SourceKind::Newznab => write!(f, "newznab"),
        }
    }
}

/// What a source's API supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    #[serde(default)]
    pub supports_id_search: bool,
    #[serde(default = "default_true")]
    pub supports_title_search: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    3
}

fn default_api_path() -> String {
    "/api".to_string()
}

fn default_priority() -> u32 {
    25
}

fn default_rpm() -> u32 {
    60
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self {
            supports_id_search: false,
            supports_title_search: true,
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// A configured content source (`[[sources]]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub base_url: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub categories: Vec<u32>,
    #[serde(default)]
    pub capabilities: SourceCapabilities,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower is preferred when breaking ties.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Requests per minute; 0 disables limiting.
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
}

impl SourceDefinition {
    pub fn protocol(&self) -> Protocol {
        match self.kind {
            SourceKind::Torznab => Protocol::Torrent,
            SourceKind::Newznab => Protocol::Usenet,
        }
    }
}

// ============================================================================
// Request chains
// ============================================================================

/// A single page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub offset: u32,
    pub limit: u32,
}

/// Pages of one search strategy, fetched in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tier {
    pub pages: Vec<PageRequest>,
}

/// How the executor walks the tiers of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPolicy {
    /// Move on to the next tier only when the previous one found nothing.
    FirstNonEmpty,
    /// Only tier 0 is run.
    Recent,
}

/// Ordered search strategies for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestChain {
    pub tiers: Vec<Tier>,
    pub policy: ChainPolicy,
}

impl RequestChain {
    pub fn new(policy: ChainPolicy) -> Self {
        Self {
            tiers: Vec::new(),
            policy,
        }
    }

    /// Append a tier; empty tiers are dropped.
    pub fn push_tier(&mut self, tier: Tier) {
        if !tier.pages.is_empty() {
            self.tiers.push(tier);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors scoped to a single source. They never escape the aggregator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexerError {
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid API key: {0}")]
    ApiKey(String),

    #[error("Request limit reached")]
    RequestLimit,

    #[error("Indexer API error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("No source implementation registered for kind {0}")]
    UnsupportedKind(SourceKind),
}

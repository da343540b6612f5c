use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::decision::{AcceptanceProfile, CustomFormat, QualityDefinition, RankingConfig, Target};
use crate::import::ImportConfig;
use crate::indexer::{SearchCriteria, SourceCapabilities, SourceDefinition, SourceKind};
use crate::orchestrator::OrchestratorConfig;
use crate::searcher::{AggregatorConfig, CircuitBreakerConfig, MAX_CONCURRENCY};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
    #[serde(default)]
    pub profiles: Vec<AcceptanceProfile>,
    #[serde(default)]
    pub custom_formats: Vec<CustomFormat>,
    #[serde(default)]
    pub quality_definitions: Vec<QualityDefinition>,
    #[serde(default)]
    pub download_client: Option<DownloadClientConfig>,
    #[serde(default)]
    pub wanted: Vec<WantedConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8989
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mediarr.db")
}

/// Search fan-out and circuit breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Concurrent source queries, capped at 16.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Per-source timeout in seconds.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
    /// Consecutive failures before a source is disabled.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
    /// Overrides every source's page limit when set.
    #[serde(default)]
    pub max_pages: Option<u32>,
}

fn default_concurrency() -> usize {
    MAX_CONCURRENCY
}

fn default_source_timeout() -> u64 {
    30
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    60
}

fn default_backoff_max() -> u64 {
    3600
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            source_timeout_secs: default_source_timeout(),
            breaker_threshold: default_breaker_threshold(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            max_pages: None,
        }
    }
}

impl SearchConfig {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_concurrency: self.max_concurrency.clamp(1, MAX_CONCURRENCY),
            source_timeout: Duration::from_secs(self.source_timeout_secs),
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: self.breaker_threshold,
            base_backoff: Duration::from_secs(self.backoff_base_secs),
            max_backoff: Duration::from_secs(self.backoff_max_secs),
        }
    }

    /// Apply `max_pages` to a source definition.
    pub fn apply_limits(&self, mut definition: SourceDefinition) -> SourceDefinition {
        if let Some(max_pages) = self.max_pages {
            definition.capabilities = SourceCapabilities {
                max_pages,
                ..definition.capabilities
            };
        }
        definition
    }
}

/// Download client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadClientConfig {
    /// Download client backend type
    pub backend: DownloadClientBackend,
    /// qBittorrent-specific configuration (required when backend = "qbittorrent")
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
}

/// Available download client backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadClientBackend {
    Qbittorrent,
}

/// qBittorrent Web API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    #[serde(default = "default_qbittorrent_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Category assigned to every submitted torrent
    #[serde(default)]
    pub category: Option<String>,
    /// Save path override
    #[serde(default)]
    pub download_path: Option<String>,
}

fn default_qbittorrent_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for QBittorrentConfig {
    fn default() -> Self {
        Self {
            url: default_qbittorrent_url(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout(),
            category: None,
            download_path: None,
        }
    }
}

/// A target to acquire (`[[wanted]]` in the config file)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WantedConfig {
    pub id: String,
    /// Acceptance profile id
    pub profile: String,
    /// Title to search for
    pub terms: String,
    #[serde(default)]
    pub year: Option<u16>,
    /// `scheme:value`, e.g. `imdb:tt0111161`
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub categories: Vec<u32>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    /// Enables the per-quality size limits for this target
    #[serde(default)]
    pub runtime_minutes: Option<u32>,
}

impl WantedConfig {
    pub fn target(&self) -> Target {
        let target = Target::new(self.id.as_str(), self.profile.as_str());
        match self.runtime_minutes {
            Some(minutes) => target.with_runtime(minutes),
            None => target,
        }
    }

    pub fn criteria(&self) -> SearchCriteria {
        SearchCriteria {
            year: self.year,
            external_id: self.external_id.clone(),
            categories: self.categories.clone(),
            season: self.season,
            episode: self.episode,
            ..SearchCriteria::new(self.id.as_str(), self.terms.as_str())
        }
    }
}

// ============================================================================
// Sanitized view
// ============================================================================

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub orchestrator: OrchestratorConfig,
    pub ranking: RankingConfig,
    pub import: ImportConfig,
    pub sources: Vec<SanitizedSourceConfig>,
    pub profiles: Vec<String>,
    pub custom_formats: Vec<String>,
    pub quality_definitions: Vec<QualityDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_client: Option<SanitizedDownloadClientConfig>,
    pub wanted: Vec<String>,
}

/// Sanitized source (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceConfig {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub base_url: String,
    pub api_key_configured: bool,
    pub enabled: bool,
    pub priority: u32,
}

/// Sanitized download client (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDownloadClientConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub credentials_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            search: config.search.clone(),
            orchestrator: config.orchestrator.clone(),
            ranking: config.ranking.clone(),
            import: config.import.clone(),
            sources: config
                .sources
                .iter()
                .map(|s| SanitizedSourceConfig {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    kind: s.kind,
                    base_url: s.base_url.clone(),
                    api_key_configured: !s.api_key.is_empty(),
                    enabled: s.enabled,
                    priority: s.priority,
                })
                .collect(),
            profiles: config.profiles.iter().map(|p| p.id.clone()).collect(),
            custom_formats: config.custom_formats.iter().map(|f| f.name.clone()).collect(),
            quality_definitions: config.quality_definitions.clone(),
            download_client: config
                .download_client
                .as_ref()
                .map(|c| SanitizedDownloadClientConfig {
                    backend: match c.backend {
                        DownloadClientBackend::Qbittorrent => "qbittorrent".to_string(),
                    },
                    url: c.qbittorrent.as_ref().map(|q| q.url.clone()),
                    credentials_configured: c
                        .qbittorrent
                        .as_ref()
                        .map(|q| !q.password.is_empty())
                        .unwrap_or(false),
                }),
            wanted: config.wanted.iter().map(|w| w.id.clone()).collect(),
        }
    }
}

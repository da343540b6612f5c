pub mod blocklist;
pub mod config;
pub mod decision;
pub mod download_client;
pub mod events;
pub mod import;
pub mod indexer;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod searcher;
pub mod store;
pub mod testing;
pub mod tracked;

pub use blocklist::{BlocklistEntry, BlocklistStore, SqliteBlocklistStore};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ConfigProfileStore,
    DownloadClientBackend, ProfileStore, SanitizedConfig,
};
pub use decision::{
    AcceptanceProfile, Decision, DecisionEngine, DecisionScore, EvaluationContext, Rejection,
    Target,
};
pub use download_client::{
    ClientDownloadId, ClientState, ClientStatus, DownloadClient, DownloadClientError,
    QBittorrentClient,
};
pub use events::{
    create_notification_system, LoggingNotificationSink, Notification, NotificationHandle,
    NotificationSink,
};
pub use import::{FileSystemImporter, ImportConfig, ImportFailure, ImportOutcome, Importer};
pub use indexer::{
    CancelSignal, ChainExecutor, IndexerError, Protocol, RateLimiterPool, ReleaseInfo,
    ReqwestTransport, SearchCriteria, Source, SourceDefinition, SourceRegistry, TargetId,
};
pub use orchestrator::{OrchestratorConfig, OrchestratorError, Pipeline, Scheduler};
pub use parser::{parse_title, ParsedInfo, Quality, QualityModel};
pub use searcher::{CircuitBreaker, SearchAggregator, SearchError};
pub use store::StoreError;
pub use tracked::{
    SqliteTrackedDownloadStore, TrackedDownload, TrackedDownloadManager, TrackedDownloadStore,
    TrackedState,
};

mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediarr_core::{
    create_notification_system, load_config, validate_config, BlocklistStore, ChainExecutor,
    CircuitBreaker, Config, ConfigProfileStore, DecisionEngine, DownloadClient,
    DownloadClientBackend, FileSystemImporter, LoggingNotificationSink, NotificationHandle,
    NotificationSink, Pipeline, ProfileStore, QBittorrentClient, RateLimiterPool,
    ReqwestTransport, SanitizedConfig, Scheduler, SearchAggregator, SourceRegistry,
    SqliteBlocklistStore, SqliteTrackedDownloadStore, TrackedDownloadManager,
    TrackedDownloadStore,
};

use api::create_router;
use state::AppState;

/// Buffer size for the notification channel
const NOTIFICATION_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("MEDIARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        config_hash = &config_hash[..16],
        database = ?config.database.path,
        sources = config.sources.len(),
        profiles = config.profiles.len(),
        "Configuration loaded"
    );

    // Create notification system
    let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LoggingNotificationSink)];
    let (notifications, dispatcher) = create_notification_system(sinks, NOTIFICATION_BUFFER_SIZE);
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let pipeline = build_pipeline(&config, notifications.clone())?;
    if let Some(pipeline) = &pipeline {
        for wanted in &config.wanted {
            pipeline.add_wanted(wanted.target(), wanted.criteria()).await;
        }
    }

    // Create scheduler if enabled
    let scheduler = match &pipeline {
        Some(pipeline) if config.orchestrator.enabled => {
            let scheduler = Arc::new(Scheduler::new(
                config.orchestrator.clone(),
                Arc::clone(pipeline),
            ));
            scheduler.start().await;
            spawn_initial_searches(Arc::clone(pipeline));
            Some(scheduler)
        }
        Some(_) => {
            info!("Scheduler disabled in config");
            None
        }
        None => None,
    };

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        pipeline,
        scheduler.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(ref scheduler) = scheduler {
        info!("Stopping scheduler...");
        scheduler.stop().await;
    }

    // Drop all holders of the notification handle so the dispatcher's
    // channel closes and it drains what is left.
    drop(scheduler);
    drop(notifications);
    if tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
        .await
        .is_err()
    {
        warn!("Notification dispatcher did not finish in time");
    }

    info!("Server stopped");
    Ok(())
}

/// Wire stores, sources, download client and importer into a pipeline.
/// Returns `None` when no download client is configured.
fn build_pipeline(
    config: &Config,
    notifications: NotificationHandle,
) -> Result<Option<Arc<Pipeline>>> {
    let client: Arc<dyn DownloadClient> = match &config.download_client {
        Some(dc) => match dc.backend {
            DownloadClientBackend::Qbittorrent => {
                let qb = dc
                    .qbittorrent
                    .clone()
                    .context("qbittorrent backend selected but no qbittorrent config provided")?;
                info!("Initializing qBittorrent client at {}", qb.url);
                Arc::new(
                    QBittorrentClient::new(qb).context("Failed to create qBittorrent client")?,
                )
            }
        },
        None => {
            info!("No download client configured, pipeline disabled");
            return Ok(None);
        }
    };

    let downloads: Arc<dyn TrackedDownloadStore> = Arc::new(
        SqliteTrackedDownloadStore::new(&config.database.path)
            .context("Failed to create tracked download store")?,
    );
    let blocklist: Arc<dyn BlocklistStore> = Arc::new(
        SqliteBlocklistStore::new(&config.database.path)
            .context("Failed to create blocklist store")?,
    );
    info!("Stores initialized");

    let profiles = Arc::new(ConfigProfileStore::new(config));
    let definitions = profiles.sources();
    let sources = SourceRegistry::default().build_all(&definitions);

    let aggregator_config = config.search.aggregator_config();
    let transport = Arc::new(
        ReqwestTransport::new(aggregator_config.source_timeout)
            .context("Failed to create HTTP transport")?,
    );
    let limiters = RateLimiterPool::new(
        definitions
            .iter()
            .map(|d| (d.name.as_str(), d.requests_per_minute)),
    );
    let aggregator = Arc::new(SearchAggregator::new(
        sources,
        Arc::new(ChainExecutor::new(transport, limiters)),
        Arc::new(CircuitBreaker::new(config.search.breaker_config())),
        aggregator_config,
        notifications.clone(),
    ));
    info!(sources = ?aggregator.source_names(), "Search aggregator initialized");

    let importer = Arc::new(FileSystemImporter::new(config.import.clone()));
    let manager = Arc::new(TrackedDownloadManager::new(
        Arc::clone(&downloads),
        Arc::clone(&blocklist),
        client,
        importer,
        notifications,
        config.orchestrator.tracked_config(),
    ));

    let pipeline = Pipeline::new(
        aggregator,
        DecisionEngine::new(config.ranking.clone())
            .with_quality_definitions(config.quality_definitions.clone()),
        profiles,
        blocklist,
        downloads,
        manager,
    );
    Ok(Some(pipeline))
}

/// Search once for every wanted target without waiting for the next
/// recent release sync.
fn spawn_initial_searches(pipeline: Arc<Pipeline>) {
    tokio::spawn(async move {
        for wanted in pipeline.wanted().await {
            let target_id = wanted.target.id;
            match pipeline.search_and_grab(&target_id).await {
                Ok(Some(download)) => {
                    info!(target_id = %target_id, title = download.title(), "Grabbed release")
                }
                Ok(None) => {}
                Err(e) => warn!(target_id = %target_id, error = %e, "Initial search failed"),
            }
        }
    });
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

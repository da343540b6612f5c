//! Request chain execution: HTTP transport, cancellation and paging.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiterPool;
use super::source::Source;
use super::types::{ChainPolicy, IndexerError, ReleaseInfo, RequestChain};

// ============================================================================
// Transport
// ============================================================================

/// Status and body of a fetched page.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches pages for the executor. Swapped for a fake in tests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, IndexerError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, IndexerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, IndexerError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                IndexerError::Timeout
            } else if e.is_connect() {
                IndexerError::ConnectionFailed(e.to_string())
            } else {
                IndexerError::Request(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| IndexerError::Request(format!("Failed to read body: {}", e)))?;

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Read side of a cancellation flag. Cloned into every task of a search.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Write side of a cancellation flag.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    /// A connected handle and signal, not yet raised.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that is never raised.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Runs request chains page by page through a transport, honouring
/// per-source rate limits and cancellation.
pub struct ChainExecutor {
    transport: Arc<dyn HttpTransport>,
    limiters: RateLimiterPool,
}

impl ChainExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, limiters: RateLimiterPool) -> Self {
        Self {
            transport,
            limiters,
        }
    }

    /// Execute `chain` for `source`.
    ///
    /// Pages within a tier run in order and stop at the first short page.
    /// With [`ChainPolicy::FirstNonEmpty`] a tier only runs if the previous
    /// ones found nothing. Cancellation is checked before each tier and each
    /// page; whatever was gathered before it is returned.
    pub async fn execute(
        &self,
        source: &dyn Source,
        chain: &RequestChain,
        cancel: &CancelSignal,
    ) -> Result<Vec<ReleaseInfo>, IndexerError> {
        let name = source.name();
        let tiers = match chain.policy {
            ChainPolicy::Recent => &chain.tiers[..chain.tiers.len().min(1)],
            ChainPolicy::FirstNonEmpty => &chain.tiers[..],
        };

        let mut releases = Vec::new();
        for (tier_index, tier) in tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(source = name, tier = tier_index, "Search cancelled before tier");
                break;
            }

            for page in &tier.pages {
                if cancel.is_cancelled() {
                    debug!(source = name, offset = page.offset, "Search cancelled before page");
                    return Ok(releases);
                }

                self.limiters.acquire(name).await;
                let response = self.transport.get(&page.url).await?;
                if !response.is_success() {
                    warn!(source = name, status = response.status, "Source returned error status");
                    return Err(IndexerError::Http {
                        status: response.status,
                    });
                }

                let mut items = source.parse_response(&response.body)?;
                let count = items.len();
                releases.append(&mut items);

                debug!(
                    source = name,
                    tier = tier_index,
                    offset = page.offset,
                    results = count,
                    "Fetched page"
                );

                if (count as u32) < page.limit {
                    break;
                }
            }

            if !releases.is_empty() {
                break;
            }
        }

        Ok(releases)
    }
}

//! Mock HTTP transport and a line-based source for chain and aggregator tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::indexer::{
    ChainPolicy, HttpResponse, HttpTransport, IndexerError, PageRequest, Protocol, ReleaseInfo,
    RequestChain, SearchCriteria, Source, SourceCapabilities, SourceDefinition, SourceKind, Tier,
};

/// Mock implementation of [`HttpTransport`].
///
/// Unknown URLs answer `200` with an empty body. Every request is recorded,
/// including ones that later time out.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Arc<RwLock<HashMap<String, HttpResponse>>>,
    errors: Arc<RwLock<HashMap<String, IndexerError>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    requested: Arc<RwLock<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, url: &str, response: HttpResponse) {
        self.responses
            .write()
            .await
            .insert(url.to_string(), response);
    }

    /// Make requests for `url` fail with `error`.
    pub async fn fail(&self, url: &str, error: IndexerError) {
        self.errors.write().await.insert(url.to_string(), error);
    }

    /// Hold requests for `url` for `delay` before answering.
    pub async fn delay(&self, url: &str, delay: Duration) {
        self.delays.write().await.insert(url.to_string(), delay);
    }

    /// URLs requested so far, in order.
    pub async fn requested(&self) -> Vec<String> {
        self.requested.read().await.clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, IndexerError> {
        self.requested.write().await.push(url.to_string());

        let delay = self.delays.read().await.get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.errors.read().await.get(url) {
            return Err(error.clone());
        }

        Ok(self
            .responses
            .read()
            .await
            .get(url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::ok("")))
    }
}

/// A [`Source`] with a trivial wire format, for exercising the executor and
/// aggregator without XML.
///
/// Search requests go to `static://{name}/search`, recent requests to
/// `static://{name}/recent`. Each non-empty response line is one release:
/// `title[|size[|seeders]]`.
#[derive(Debug, Clone)]
pub struct StaticSource {
    definition: SourceDefinition,
}

impl StaticSource {
    pub fn new(name: &str, protocol: Protocol) -> Self {
        let kind = match protocol {
            Protocol::Torrent => SourceKind::Torznab,
            Protocol::Usenet => SourceKind::Newznab,
        };
        Self {
            definition: SourceDefinition {
                id: name.to_string(),
                name: name.to_string(),
                kind,
                base_url: format!("static://{}", name),
                api_path: String::new(),
                api_key: String::new(),
                categories: Vec::new(),
                capabilities: SourceCapabilities::default(),
                enabled: true,
                priority: 25,
                requests_per_minute: 0,
            },
        }
    }

    pub fn definition_mut(&mut self) -> &mut SourceDefinition {
        &mut self.definition
    }

    fn single_page(&self, path: &str, policy: ChainPolicy) -> RequestChain {
        let mut chain = RequestChain::new(policy);
        chain.push_tier(Tier {
            pages: vec![PageRequest {
                url: format!("{}/{}", self.definition.base_url, path),
                offset: 0,
                limit: self.definition.capabilities.page_size,
            }],
        });
        chain
    }
}

impl Source for StaticSource {
    fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    fn build_recent_chain(&self) -> RequestChain {
        self.single_page("recent", ChainPolicy::Recent)
    }

    fn build_search_chain(&self, _criteria: &SearchCriteria) -> RequestChain {
        self.single_page("search", ChainPolicy::FirstNonEmpty)
    }

    fn parse_response(&self, body: &str) -> Result<Vec<ReleaseInfo>, IndexerError> {
        let protocol = self.definition.protocol();
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let mut fields = line.split('|');
                let title = fields.next().unwrap_or_default();
                let mut release = ReleaseInfo::new(
                    title,
                    format!("{}/download/{}", self.definition.base_url, title),
                    &self.definition.name,
                    protocol,
                );
                if let Some(size) = fields.next() {
                    release.size = size
                        .parse()
                        .map_err(|_| IndexerError::Parse(format!("bad size: {}", size)))?;
                }
                if let Some(seeders) = fields.next() {
                    release.seeders = Some(
                        seeders
                            .parse()
                            .map_err(|_| IndexerError::Parse(format!("bad seeders: {}", seeders)))?,
                    );
                }
                Ok(release)
            })
            .collect()
    }
}

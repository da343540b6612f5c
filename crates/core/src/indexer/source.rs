use super::types::{IndexerError, ReleaseInfo, RequestChain, SearchCriteria, SourceDefinition};

/// A pluggable content source: knows how to build its request chains and
/// how to read its own response format. Fetching is left to the
/// [`ChainExecutor`](super::ChainExecutor).
pub trait Source: Send + Sync {
    fn definition(&self) -> &SourceDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }

    /// Latest releases, tier 0 only.
    fn build_recent_chain(&self) -> RequestChain;

    /// Tier 0 = external id, tier 1 = title, tier 2 = category browse.
    /// Tiers the source or criteria cannot support are omitted.
    fn build_search_chain(&self, criteria: &SearchCriteria) -> RequestChain;

    fn parse_response(&self, body: &str) -> Result<Vec<ReleaseInfo>, IndexerError>;
}

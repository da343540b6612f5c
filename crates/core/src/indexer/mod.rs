//! Content sources and their request chains.
//!
//! A [`Source`] describes how to query one provider; the [`ChainExecutor`]
//! fetches the pages of a [`RequestChain`] and hands bodies back to the
//! source for parsing.

mod chain;
mod rate_limiter;
mod registry;
mod source;
mod torznab;
mod types;

pub use chain::{CancelHandle, CancelSignal, ChainExecutor, HttpResponse, HttpTransport, ReqwestTransport};
pub use rate_limiter::{RateLimiterPool, TokenBucket};
pub use registry::{SourceFactory, SourceRegistry};
pub use source::Source;
pub use torznab::{parse_feed, NewznabFamilySource};
pub use types::*;

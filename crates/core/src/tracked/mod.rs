//! Lifecycle of grabbed releases, from submission to import.
//!
//! Every state change goes through [`transition`], the single gate over the
//! state table, and is persisted by a [`TrackedDownloadStore`].

mod manager;
mod sqlite;
mod store;
mod types;

pub use manager::{PollSummary, Redownloader, TrackedConfig, TrackedDownloadManager};
pub use sqlite::SqliteTrackedDownloadStore;
pub use store::TrackedDownloadStore;
pub use types::{transition, TrackedDownload, TrackedError, TrackedState, TransitionRecord};

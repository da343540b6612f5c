//! Releases that must not be grabbed again.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteBlocklistStore;
pub use store::BlocklistStore;
pub use types::BlocklistEntry;

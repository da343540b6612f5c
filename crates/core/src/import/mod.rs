//! Importing finished downloads into the library.

mod fs_importer;
mod types;

pub use fs_importer::{FileSystemImporter, ImportConfig};
pub use types::{ImportFailure, ImportOutcome, Importer};

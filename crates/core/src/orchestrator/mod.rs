//! Core operations and the background scheduler.
//!
//! [`Pipeline`] is what callers use: search, grab and manage the download
//! queue. [`Scheduler`] drives it periodically:
//! - **Recent release sync**: newest releases matched against wanted targets
//! - **Download poll**: client status folded into tracked downloads
//! - **Import retry**: completed downloads imported, failed imports retried

mod config;
mod pipeline;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use pipeline::Pipeline;
pub use runner::Scheduler;
pub use types::{OrchestratorError, SchedulerStatus, WantedTarget};

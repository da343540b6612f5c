use std::sync::Arc;

use mediarr_core::{Config, Pipeline, SanitizedConfig, Scheduler};

/// Shared application state
pub struct AppState {
    config: Config,
    pipeline: Option<Arc<Pipeline>>,
    scheduler: Option<Arc<Scheduler>>,
}

impl AppState {
    pub fn new(
        config: Config,
        pipeline: Option<Arc<Pipeline>>,
        scheduler: Option<Arc<Scheduler>>,
    ) -> Self {
        Self {
            config,
            pipeline,
            scheduler,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn pipeline(&self) -> Option<&Arc<Pipeline>> {
        self.pipeline.as_ref()
    }

    pub fn scheduler(&self) -> Option<&Arc<Scheduler>> {
        self.scheduler.as_ref()
    }
}

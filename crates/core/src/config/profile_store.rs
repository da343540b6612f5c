use std::collections::HashMap;

use super::types::Config;
use crate::decision::{AcceptanceProfile, CustomFormat};
use crate::indexer::SourceDefinition;

/// Read access to profiles, sources and custom formats.
pub trait ProfileStore: Send + Sync {
    fn profile(&self, id: &str) -> Option<AcceptanceProfile>;

    fn source(&self, id: &str) -> Option<SourceDefinition>;

    /// Every configured source, enabled or not.
    fn sources(&self) -> Vec<SourceDefinition>;

    fn custom_formats(&self) -> Vec<CustomFormat>;
}

/// [`ProfileStore`] over the loaded configuration.
pub struct ConfigProfileStore {
    profiles: HashMap<String, AcceptanceProfile>,
    sources: Vec<SourceDefinition>,
    custom_formats: Vec<CustomFormat>,
}

impl ConfigProfileStore {
    pub fn new(config: &Config) -> Self {
        Self {
            profiles: config
                .profiles
                .iter()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
            sources: config
                .sources
                .iter()
                .cloned()
                .map(|s| config.search.apply_limits(s))
                .collect(),
            custom_formats: config.custom_formats.clone(),
        }
    }
}

impl ProfileStore for ConfigProfileStore {
    fn profile(&self, id: &str) -> Option<AcceptanceProfile> {
        self.profiles.get(id).cloned()
    }

    fn source(&self, id: &str) -> Option<SourceDefinition> {
        self.sources.iter().find(|s| s.id == id).cloned()
    }

    fn sources(&self) -> Vec<SourceDefinition> {
        self.sources.clone()
    }

    fn custom_formats(&self) -> Vec<CustomFormat> {
        self.custom_formats.clone()
    }
}

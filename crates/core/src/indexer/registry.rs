//! Maps source kinds to constructors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::source::Source;
use super::torznab::NewznabFamilySource;
use super::types::{IndexerError, SourceDefinition, SourceKind};

/// Builds a source from its definition.
pub type SourceFactory = fn(SourceDefinition) -> Result<Arc<dyn Source>, IndexerError>;

fn newznab_family(definition: SourceDefinition) -> Result<Arc<dyn Source>, IndexerError> {
    Ok(Arc::new(NewznabFamilySource::new(definition)))
}

/// Registry of source implementations by kind.
pub struct SourceRegistry {
    factories: HashMap<SourceKind, SourceFactory>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SourceKind::Torznab, newznab_family);
        registry.register(SourceKind::Newznab, newznab_family);
        registry
    }
}

impl SourceRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for a kind.
    pub fn register(&mut self, kind: SourceKind, factory: SourceFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn build(&self, definition: SourceDefinition) -> Result<Arc<dyn Source>, IndexerError> {
        let factory = self
            .factories
            .get(&definition.kind)
            .ok_or(IndexerError::UnsupportedKind(definition.kind))?;
        factory(definition)
    }

    /// Build every definition; ones that fail to build are logged and
    /// skipped.
    pub fn build_all(&self, definitions: &[SourceDefinition]) -> Vec<Arc<dyn Source>> {
        definitions
            .iter()
            .filter_map(|def| match self.build(def.clone()) {
                Ok(source) => {
                    info!(source = %def.name, kind = %def.kind, enabled = def.enabled, "Source configured");
                    Some(source)
                }
                Err(e) => {
                    warn!(source = %def.name, error = %e, "Failed to build source");
                    None
                }
            })
            .collect()
    }
}

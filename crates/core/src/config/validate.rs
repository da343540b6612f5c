use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Source and profile ids are unique, source URLs are set
/// - Every profile allows at least one quality and its cutoff is allowed
/// - Custom format patterns compile
/// - Wanted targets are unique and reference a known profile
/// - A qbittorrent backend has its settings section
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.search.max_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "search.max_concurrency must be at least 1".to_string(),
        ));
    }

    let mut source_ids = HashSet::new();
    for source in &config.sources {
        if !source_ids.insert(source.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate source id '{}'",
                source.id
            )));
        }
        if source.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "source '{}' has no base_url",
                source.id
            )));
        }
    }

    let mut profile_ids = HashSet::new();
    for profile in &config.profiles {
        if !profile_ids.insert(profile.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate profile id '{}'",
                profile.id
            )));
        }
        if profile.qualities.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}' allows no qualities",
                profile.id
            )));
        }
        if profile.quality_weight(profile.cutoff).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}' cutoff {} is not an allowed quality",
                profile.id, profile.cutoff
            )));
        }
        if let (Some(min), Some(max)) = (profile.min_size_mb, profile.max_size_mb) {
            if min > max {
                return Err(ConfigError::ValidationError(format!(
                    "profile '{}' min_size_mb exceeds max_size_mb",
                    profile.id
                )));
            }
        }
    }

    for format in &config.custom_formats {
        format.validate().map_err(ConfigError::ValidationError)?;
    }

    let mut defined = HashSet::new();
    for definition in &config.quality_definitions {
        if !defined.insert(definition.quality) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate quality definition for {}",
                definition.quality
            )));
        }
        definition.validate().map_err(ConfigError::ValidationError)?;
    }

    let mut wanted_ids = HashSet::new();
    for wanted in &config.wanted {
        if !wanted_ids.insert(wanted.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate wanted id '{}'",
                wanted.id
            )));
        }
        if wanted.terms.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "wanted '{}' has no search terms",
                wanted.id
            )));
        }
        if !config.profiles.iter().any(|p| p.id == wanted.profile) {
            return Err(ConfigError::ValidationError(format!(
                "wanted '{}' references unknown profile '{}'",
                wanted.id, wanted.profile
            )));
        }
    }

    if let Some(client) = &config.download_client {
        if client.qbittorrent.is_none() {
            return Err(ConfigError::ValidationError(
                "download_client.qbittorrent section is required for backend 'qbittorrent'"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

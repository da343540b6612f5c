//! Per-quality size limits (`[[quality_definitions]]`).
//!
//! Limits are megabytes per minute of runtime, so one definition covers a
//! short film and a three hour epic alike. They only apply to targets with a
//! known runtime.

use serde::{Deserialize, Serialize};

use crate::parser::Quality;

/// Size limits for one quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDefinition {
    pub quality: Quality,
    #[serde(default)]
    pub min_mb_per_minute: f64,
    /// `None` or zero means unlimited.
    #[serde(default)]
    pub max_mb_per_minute: Option<f64>,
}

impl QualityDefinition {
    pub fn new(quality: Quality, min_mb_per_minute: f64, max_mb_per_minute: Option<f64>) -> Self {
        Self {
            quality,
            min_mb_per_minute,
            max_mb_per_minute,
        }
    }

    /// Smallest acceptable size for `runtime_minutes`.
    pub fn minimum_mb(&self, runtime_minutes: u32) -> u64 {
        (self.min_mb_per_minute * f64::from(runtime_minutes)).round() as u64
    }

    /// Largest acceptable size for `runtime_minutes`.
    pub fn maximum_mb(&self, runtime_minutes: u32) -> Option<u64> {
        self.max_mb_per_minute
            .filter(|max| *max > 0.0)
            .map(|max| (max * f64::from(runtime_minutes)).round() as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.min_mb_per_minute.is_finite() || self.min_mb_per_minute < 0.0 {
            return Err(format!(
                "quality definition {} has an invalid min_mb_per_minute",
                self.quality
            ));
        }
        if let Some(max) = self.max_mb_per_minute {
            if !max.is_finite() || max < 0.0 {
                return Err(format!(
                    "quality definition {} has an invalid max_mb_per_minute",
                    self.quality
                ));
            }
            if max > 0.0 && max < self.min_mb_per_minute {
                return Err(format!(
                    "quality definition {} min_mb_per_minute exceeds max_mb_per_minute",
                    self.quality
                ));
            }
        }
        Ok(())
    }
}

/// First definition for `quality`.
pub fn definition_for(
    definitions: &[QualityDefinition],
    quality: Quality,
) -> Option<&QualityDefinition> {
    definitions.iter().find(|d| d.quality == quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_scale_with_runtime() {
        let def = QualityDefinition::new(Quality::Bluray1080p, 25.0, Some(35.0));
        assert_eq!(def.minimum_mb(20), 500);
        assert_eq!(def.maximum_mb(20), Some(700));
        assert_eq!(def.minimum_mb(45), 1125);
        assert_eq!(def.maximum_mb(45), Some(1575));
    }

    #[test]
    fn test_zero_maximum_is_unlimited() {
        let def = QualityDefinition::new(Quality::Remux2160p, 100.0, Some(0.0));
        assert_eq!(def.maximum_mb(120), None);
        let uncapped = QualityDefinition::new(Quality::Remux2160p, 0.0, None);
        assert_eq!(uncapped.maximum_mb(120), None);
    }

    #[test]
    fn test_validate() {
        assert!(QualityDefinition::new(Quality::Hdtv720p, 10.0, Some(20.0)).validate().is_ok());
        assert!(QualityDefinition::new(Quality::Hdtv720p, 10.0, Some(0.0)).validate().is_ok());
        assert!(QualityDefinition::new(Quality::Hdtv720p, 30.0, Some(20.0)).validate().is_err());
        assert!(QualityDefinition::new(Quality::Hdtv720p, -1.0, None).validate().is_err());
        assert!(QualityDefinition::new(Quality::Hdtv720p, f64::NAN, None).validate().is_err());
    }

    #[test]
    fn test_definition_for_picks_matching_quality() {
        let defs = vec![
            QualityDefinition::new(Quality::Hdtv720p, 5.0, None),
            QualityDefinition::new(Quality::Bluray1080p, 20.0, None),
        ];
        assert_eq!(
            definition_for(&defs, Quality::Bluray1080p).map(|d| d.min_mb_per_minute),
            Some(20.0)
        );
        assert!(definition_for(&defs, Quality::Remux2160p).is_none());
    }
}

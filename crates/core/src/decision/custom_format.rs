//! Custom formats: named sets of conditions that add to a release's score.

use regex_lite::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::indexer::ReleaseInfo;
use crate::parser::{Language, Resolution, Source};

/// Indexer flag a condition can test for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerFlag {
    Freeleech,
    Halfleech,
    DoubleUpload,
    Internal,
    Scene,
}

/// What a condition inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKind {
    TitleRegex { pattern: String },
    Source { source: Source },
    Resolution { resolution: Resolution },
    Language { language: Language },
    /// Regex against the parsed release group.
    ReleaseGroup { pattern: String },
    IndexerFlag { flag: IndexerFlag },
    /// Regex against the parsed edition.
    Edition { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatCondition {
    #[serde(flatten)]
    pub kind: ConditionKind,
    /// Invert the result.
    #[serde(default)]
    pub negate: bool,
    /// The format cannot match unless this condition does.
    #[serde(default)]
    pub required: bool,
}

impl FormatCondition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            negate: false,
            required: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_satisfied_by(&self, release: &ReleaseInfo) -> bool {
        self.raw_match(release) != self.negate
    }

    fn raw_match(&self, release: &ReleaseInfo) -> bool {
        let parsed = &release.parsed;
        match &self.kind {
            ConditionKind::TitleRegex { pattern } => regex_matches(pattern, &release.title),
            ConditionKind::Source { source } => parsed.source == *source,
            ConditionKind::Resolution { resolution } => parsed.resolution == *resolution,
            ConditionKind::Language { language } => release.languages.contains(language),
            ConditionKind::ReleaseGroup { pattern } => parsed
                .release_group
                .as_deref()
                .is_some_and(|group| regex_matches(pattern, group)),
            ConditionKind::IndexerFlag { flag } => {
                let flags = &release.indexer_flags;
                match flag {
                    IndexerFlag::Freeleech => flags.freeleech,
                    IndexerFlag::Halfleech => flags.halfleech,
                    IndexerFlag::DoubleUpload => flags.double_upload,
                    IndexerFlag::Internal => flags.internal,
                    IndexerFlag::Scene => flags.scene,
                }
            }
            ConditionKind::Edition { pattern } => parsed
                .edition
                .as_deref()
                .is_some_and(|edition| regex_matches(pattern, edition)),
        }
    }

    fn pattern(&self) -> Option<&str> {
        match &self.kind {
            ConditionKind::TitleRegex { pattern }
            | ConditionKind::ReleaseGroup { pattern }
            | ConditionKind::Edition { pattern } => Some(pattern),
            _ => None,
        }
    }
}

/// A named group of conditions (`[[custom_formats]]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFormat {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<FormatCondition>,
}

impl CustomFormat {
    pub fn new(name: impl Into<String>, conditions: Vec<FormatCondition>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }

    /// Matches when every required condition is satisfied and at least one
    /// condition is.
    pub fn matches(&self, release: &ReleaseInfo) -> bool {
        let mut any = false;
        for condition in &self.conditions {
            let satisfied = condition.is_satisfied_by(release);
            if condition.required && !satisfied {
                return false;
            }
            any |= satisfied;
        }
        any
    }

    /// Check that every regex condition compiles.
    pub fn validate(&self) -> Result<(), String> {
        for pattern in self.conditions.iter().filter_map(FormatCondition::pattern) {
            compile(pattern).map_err(|e| {
                format!("custom format '{}': invalid pattern '{}': {}", self.name, pattern, e)
            })?;
        }
        Ok(())
    }
}

/// Names of the formats in `formats` that `release` matches.
pub fn matching_formats(formats: &[CustomFormat], release: &ReleaseInfo) -> Vec<String> {
    formats
        .iter()
        .filter(|format| format.matches(release))
        .map(|format| format.name.clone())
        .collect()
}

fn compile(pattern: &str) -> Result<Regex, regex_lite::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn regex_matches(pattern: &str, haystack: &str) -> bool {
    match compile(pattern) {
        Ok(re) => re.is_match(haystack),
        Err(e) => {
            warn!(pattern, error = %e, "Ignoring invalid custom format pattern");
            false
        }
    }
}

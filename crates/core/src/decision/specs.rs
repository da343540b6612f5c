//! Acceptance checks, evaluated in a fixed order.

use std::collections::BTreeSet;

use regex_lite::RegexBuilder;

use super::profile::{AcceptanceProfile, EvaluationContext, Target};
use super::quality_definition::QualityDefinition;
use super::types::Rejection;
use crate::indexer::{Protocol, ReleaseInfo};
use crate::parser::Language;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Everything a check can look at for one release.
pub struct Candidate<'a> {
    pub release: &'a ReleaseInfo,
    pub target: &'a Target,
    pub profile: &'a AcceptanceProfile,
    pub context: &'a EvaluationContext,
    pub custom_format_score: i32,
    /// Size limits for the release's quality, if configured.
    pub quality_definition: Option<&'a QualityDefinition>,
}

type Check = fn(&Candidate) -> Option<Rejection>;

/// A named acceptance check.
pub struct Specification {
    pub name: &'static str,
    check: Check,
}

impl Specification {
    pub fn evaluate(&self, candidate: &Candidate) -> Option<Rejection> {
        (self.check)(candidate)
    }
}

/// All checks in evaluation order.
pub static SPECIFICATIONS: &[Specification] = &[
    Specification {
        name: "blocklist",
        check: blocklisted,
    },
    Specification {
        name: "protocol",
        check: protocol_allowed,
    },
    Specification {
        name: "category",
        check: category_allowed,
    },
    Specification {
        name: "terms",
        check: terms,
    },
    Specification {
        name: "language",
        check: language_allowed,
    },
    Specification {
        name: "quality",
        check: quality_allowed,
    },
    Specification {
        name: "upgrade",
        check: upgrade_allowed,
    },
    Specification {
        name: "cutoff",
        check: cutoff_met,
    },
    Specification {
        name: "custom_format_score",
        check: custom_format_minimum,
    },
    Specification {
        name: "size",
        check: size_limits,
    },
    Specification {
        name: "seeders",
        check: enough_seeders,
    },
    Specification {
        name: "age",
        check: max_age,
    },
];

fn blocklisted(c: &Candidate) -> Option<Rejection> {
    c.context
        .blocklist
        .iter()
        .filter(|entry| entry.target_id == c.target.id)
        .any(|entry| entry.matches(c.release))
        .then_some(Rejection::Blocklisted)
}

fn protocol_allowed(c: &Candidate) -> Option<Rejection> {
    (!c.profile.allowed_protocols.contains(&c.release.protocol)).then_some(
        Rejection::ProtocolNotAllowed {
            protocol: c.release.protocol,
        },
    )
}

fn category_allowed(c: &Candidate) -> Option<Rejection> {
    let hints = &c.context.categories;
    let categories = &c.release.categories;
    if hints.is_empty() || categories.is_empty() {
        return None;
    }
    (!categories.iter().any(|cat| hints.contains(cat))).then_some(Rejection::CategoryNotAllowed)
}

/// `/regex/` terms are matched as case-insensitive regexes, everything else
/// as a case-insensitive substring. Invalid regexes never match.
pub fn term_matches(term: &str, title: &str) -> bool {
    if let Some(pattern) = term
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .filter(|pattern| !pattern.is_empty())
    {
        return RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(title))
            .unwrap_or(false);
    }
    title.to_lowercase().contains(&term.to_lowercase())
}

fn terms(c: &Candidate) -> Option<Rejection> {
    let title = &c.release.title;

    if let Some(term) = c
        .profile
        .required_terms
        .iter()
        .find(|term| !term_matches(term, title))
    {
        return Some(Rejection::MissingRequiredTerm { term: term.clone() });
    }

    if let Some(term) = c
        .profile
        .forbidden_terms
        .iter()
        .find(|term| term_matches(term, title))
    {
        return Some(Rejection::ContainsForbiddenTerm { term: term.clone() });
    }

    c.release.parsed.is_hashed.then_some(Rejection::HashedRelease)
}

fn language_allowed(c: &Candidate) -> Option<Rejection> {
    let allowed = &c.profile.languages;
    if allowed.is_empty() {
        return None;
    }

    let languages: BTreeSet<Language> = if c.release.languages.is_empty() {
        BTreeSet::from([Language::English])
    } else {
        c.release.languages.clone()
    };

    let ok = languages.contains(&Language::Multi)
        || languages.iter().any(|language| allowed.contains(language));
    (!ok).then_some(Rejection::LanguageNotAllowed)
}

fn quality_allowed(c: &Candidate) -> Option<Rejection> {
    let quality = c.release.quality.quality;
    c.profile
        .quality_weight(quality)
        .is_none()
        .then_some(Rejection::QualityNotAllowed { quality })
}

fn upgrade_allowed(c: &Candidate) -> Option<Rejection> {
    let held = c.target.current.as_ref()?;
    if !c.profile.upgrades_allowed {
        return Some(Rejection::UpgradesDisabled);
    }

    let weight = |quality| c.profile.quality_weight(quality).unwrap_or(-1);
    let candidate = (
        weight(c.release.quality.quality),
        c.release.quality.revision,
        c.custom_format_score,
    );
    let current = (
        weight(held.quality.quality),
        held.quality.revision,
        held.custom_format_score,
    );

    (candidate <= current).then_some(Rejection::NotAnUpgrade)
}

fn cutoff_met(c: &Candidate) -> Option<Rejection> {
    if c.target.force {
        return None;
    }
    let held = c.target.current.as_ref()?;
    let cutoff = c.profile.quality_weight(c.profile.cutoff)?;
    let held_weight = c.profile.quality_weight(held.quality.quality).unwrap_or(-1);

    (held_weight >= cutoff && held.custom_format_score >= c.profile.cutoff_format_score)
        .then_some(Rejection::CutoffMet)
}

fn custom_format_minimum(c: &Candidate) -> Option<Rejection> {
    (c.custom_format_score < c.profile.min_format_score).then_some(
        Rejection::CustomFormatScoreBelowMinimum {
            score: c.custom_format_score,
            minimum: c.profile.min_format_score,
        },
    )
}

fn size_limits(c: &Candidate) -> Option<Rejection> {
    if c.release.size == 0 {
        return None;
    }
    let size_mb = c.release.size / BYTES_PER_MB;
    let (minimum, maximum) = size_bounds(c);

    if let Some(minimum_mb) = minimum {
        if size_mb < minimum_mb {
            return Some(Rejection::SizeTooSmall {
                size_mb,
                minimum_mb,
            });
        }
    }
    if let Some(maximum_mb) = maximum {
        if size_mb > maximum_mb {
            return Some(Rejection::SizeTooLarge {
                size_mb,
                maximum_mb,
            });
        }
    }
    None
}

/// Profile limits tightened by the quality's per-minute limits. The
/// per-minute limits need a known runtime.
fn size_bounds(c: &Candidate) -> (Option<u64>, Option<u64>) {
    let mut minimum = c.profile.min_size_mb;
    let mut maximum = c.profile.max_size_mb.filter(|max| *max > 0);

    let runtime = c.target.runtime_minutes.filter(|minutes| *minutes > 0);
    if let (Some(definition), Some(runtime)) = (c.quality_definition, runtime) {
        minimum = minimum.max(Some(definition.minimum_mb(runtime)));
        if let Some(limit) = definition.maximum_mb(runtime) {
            maximum = Some(maximum.map_or(limit, |max| max.min(limit)));
        }
    }
    (minimum, maximum)
}

fn enough_seeders(c: &Candidate) -> Option<Rejection> {
    if c.release.protocol != Protocol::Torrent {
        return None;
    }
    let minimum = c.profile.min_seeders?;
    let seeders = c.release.seeders.unwrap_or(0);
    (seeders < minimum).then_some(Rejection::InsufficientSeeders { seeders, minimum })
}

fn max_age(c: &Candidate) -> Option<Rejection> {
    if c.release.protocol != Protocol::Usenet {
        return None;
    }
    let maximum_days = c.profile.max_age_days.filter(|days| *days > 0)?;
    let age_days = c.release.age_days(c.context.now)?;
    (age_days > i64::from(maximum_days)).then_some(Rejection::TooOld {
        age_days,
        maximum_days,
    })
}

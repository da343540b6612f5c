use tracing::debug;

use super::custom_format::matching_formats;
use super::profile::{AcceptanceProfile, EvaluationContext, Target};
use super::quality_definition::{definition_for, QualityDefinition};
use super::ranking::{log10_bucket, size_bucket, usenet_age_bucket, RankingConfig};
use super::specs::{term_matches, Candidate, SPECIFICATIONS};
use super::types::{Decision, DecisionScore, TorrentScore};
use crate::indexer::{Protocol, ReleaseInfo};
use crate::metrics;

/// Evaluates candidate releases against an acceptance profile.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    ranking: RankingConfig,
    quality_definitions: Vec<QualityDefinition>,
}

impl DecisionEngine {
    pub fn new(ranking: RankingConfig) -> Self {
        Self {
            ranking,
            quality_definitions: Vec::new(),
        }
    }

    pub fn with_quality_definitions(mut self, definitions: Vec<QualityDefinition>) -> Self {
        self.quality_definitions = definitions;
        self
    }

    /// One decision per release.
    ///
    /// Accepted decisions come first, best first. Rejected ones follow in
    /// input order, each carrying every check it failed.
    pub fn evaluate(
        &self,
        releases: Vec<ReleaseInfo>,
        target: &Target,
        profile: &AcceptanceProfile,
        context: &EvaluationContext,
    ) -> Vec<Decision> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for mut release in releases {
            release.custom_formats = matching_formats(&context.custom_formats, &release);
            let custom_format_score = profile.format_score(&release.custom_formats);

            let candidate = Candidate {
                release: &release,
                target,
                profile,
                context,
                custom_format_score,
                quality_definition: definition_for(
                    &self.quality_definitions,
                    release.quality.quality,
                ),
            };
            let rejections: Vec<_> = SPECIFICATIONS
                .iter()
                .filter_map(|spec| spec.evaluate(&candidate))
                .collect();

            match rejections.first() {
                Some(first) => {
                    debug!(
                        title = %release.title,
                        reason = %first,
                        "Release rejected"
                    );
                    metrics::DECISIONS_REJECTED
                        .with_label_values(&[first.reason()])
                        .inc();
                    rejected.push(Decision::rejected(release, rejections));
                }
                None => {
                    let score = score(&release, profile, context, custom_format_score);
                    metrics::DECISIONS_ACCEPTED.inc();
                    accepted.push(Decision::accepted(release, score));
                }
            }
        }

        let ranking = profile.ranking.as_ref().unwrap_or(&self.ranking);
        accepted.sort_by(|a, b| match (&a.score, &b.score) {
            (Some(a), Some(b)) => ranking.compare(a, b),
            _ => std::cmp::Ordering::Equal,
        });

        accepted.extend(rejected);
        accepted
    }
}

fn score(
    release: &ReleaseInfo,
    profile: &AcceptanceProfile,
    context: &EvaluationContext,
    custom_format_score: i32,
) -> DecisionScore {
    let preferred_term_score = profile
        .preferred_terms
        .iter()
        .filter(|(term, _)| term_matches(term, &release.title))
        .map(|(_, score)| *score)
        .sum();

    let (torrent, usenet_age_bucket) = match release.protocol {
        Protocol::Torrent => (
            Some(TorrentScore {
                seeders_bucket: log10_bucket(release.seeders.unwrap_or(0)),
                peers_bucket: log10_bucket(release.peers.unwrap_or(0)),
            }),
            None,
        ),
        // Unknown publish dates rank as oldest.
        Protocol::Usenet => (
            None,
            Some(
                release
                    .publish_date
                    .map(|published| usenet_age_bucket((context.now - published).num_minutes()))
                    .unwrap_or_else(|| usenet_age_bucket(i64::MAX)),
            ),
        ),
    };

    DecisionScore {
        quality_weight: profile
            .quality_weight(release.quality.quality)
            .unwrap_or(-1),
        revision: release.quality.revision,
        custom_format_score,
        preferred_term_score,
        preferred_protocol: profile.preferred_protocol == Some(release.protocol),
        indexer_flags: release.indexer_flags.weight(),
        torrent,
        usenet_age_bucket,
        size_bucket: size_bucket(release.size),
    }
}

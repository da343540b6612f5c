//! Release evaluation and ranking.
//!
//! [`DecisionEngine::evaluate`] runs every release through the ordered
//! [`SPECIFICATIONS`](specs::SPECIFICATIONS) and ranks the accepted ones.
//! Evaluation is pure: the same release, target, profile and context always
//! produce the same decision.

pub mod custom_format;
mod engine;
mod profile;
pub mod quality_definition;
pub mod ranking;
pub mod specs;
mod types;

pub use custom_format::{ConditionKind, CustomFormat, FormatCondition, IndexerFlag};
pub use engine::DecisionEngine;
pub use profile::{AcceptanceProfile, EvaluationContext, HeldFile, Target};
pub use quality_definition::QualityDefinition;
pub use ranking::{RankingConfig, RankingKey};
pub use types::{Decision, DecisionScore, Rejection, TorrentScore};

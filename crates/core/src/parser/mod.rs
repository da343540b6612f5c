//! Release title parsing.
//!
//! Turns free-text release names into structured [`ParsedInfo`]. Parsing is
//! pure and infallible.

pub mod roman;
pub mod rules;
mod title;
mod types;

pub use title::{clean_search_terms, normalize_title, parse_title};
pub use types::{
    Language, Modifier, ParsedInfo, Quality, QualityModel, Resolution, Revision, Source,
    VideoCodec,
};

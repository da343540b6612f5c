//! Rule-table evaluation over a single release title.

use std::ops::Range;

use regex_lite::Captures;
use tracing::trace;

use super::roman::from_roman;
use super::rules::{
    MatchMode, Placement, Rule, FILE_EXTENSION, GROUP_JUNK_SUFFIX, HASHED_RELEASE, RULES,
    TORRENT_SUFFIX, WEBSITE_PREFIX,
};
use super::types::{ParsedInfo, Quality, Resolution, Source};

/// Parse a raw release title. Never fails: input nothing can be extracted
/// from yields a result with `Unknown` quality and `is_fully_parsed = false`.
pub fn parse_title(raw: &str) -> ParsedInfo {
    let cleaned = preprocess(raw);
    if cleaned.is_empty() {
        return ParsedInfo::unparsed("");
    }

    let mut ctx = ParseContext::new(&cleaned);
    for rule in RULES.iter() {
        ctx.apply(rule);
    }

    let mut info = ctx.finish();
    let bare = FILE_EXTENSION.replace(raw.trim(), "");
    info.is_hashed = HASHED_RELEASE.iter().any(|re| re.is_match(&bare));

    trace!(
        raw = %raw,
        title = %info.title,
        quality = %info.quality.quality,
        fully_parsed = info.is_fully_parsed,
        "Parsed release title"
    );
    info
}

/// Reduce a title to the form used for identity comparisons: lowercase
/// alphanumerics only, with articles and conjunctions dropped unless they
/// lead the title.
pub fn normalize_title(title: &str) -> String {
    const ARTICLES: [&str; 6] = ["a", "an", "the", "and", "or", "of"];

    let lower = title.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let last = words.len().saturating_sub(1);

    words
        .iter()
        .enumerate()
        .filter(|(i, w)| *i == 0 || !ARTICLES.contains(*w) || (**w == "a" && *i == last))
        .map(|(_, w)| *w)
        .collect()
}

/// Lowercase the words of `terms` and drop punctuation, for use as a
/// free-text query against a source.
pub fn clean_search_terms(terms: &str) -> String {
    terms
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn preprocess(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .map(|c| if c.is_control() || c == '_' { ' ' } else { c })
        .collect();

    let mut name = spaced.trim().to_string();
    for pattern in [&*FILE_EXTENSION, &*TORRENT_SUFFIX, &*WEBSITE_PREFIX, &*GROUP_JUNK_SUFFIX] {
        name = pattern.replace(&name, "").trim().to_string();
    }
    name
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Turn the raw title slice into a display title.
fn display_title(slice: &str) -> String {
    slice
        .split(|c: char| c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, ' ' | '-' | '(' | '[' | '{'))
        .to_string()
}

struct ParseContext<'a> {
    cleaned: &'a str,
    /// Copy of `cleaned` with claimed tokens blanked to spaces. Byte offsets
    /// stay aligned with `cleaned`.
    working: String,
    info: ParsedInfo,
    /// Start of the earliest anchor token accepted so far.
    title_end: Option<usize>,
    /// Tail tokens (group, language, edition, revision) are only accepted
    /// at or after this offset.
    tail_floor: Option<usize>,
    season_marker: Option<usize>,
}

impl<'a> ParseContext<'a> {
    fn new(cleaned: &'a str) -> Self {
        let tail_floor = RULES
            .iter()
            .filter(|r| r.placement == Placement::Anchor)
            .filter_map(|r| r.probe(cleaned))
            .min();

        Self {
            cleaned,
            working: cleaned.to_string(),
            info: ParsedInfo::default(),
            title_end: None,
            tail_floor,
            season_marker: None,
        }
    }

    fn apply(&mut self, rule: &Rule) {
        if rule.placement == Placement::Tail && self.tail_floor.is_none() {
            return;
        }

        let snapshot = self.working.clone();
        let mut candidates: Vec<Captures<'_>> = rule.pattern.captures_iter(&snapshot).collect();
        match rule.mode {
            MatchMode::Last => candidates.reverse(),
            MatchMode::Year => self.order_year_candidates(&mut candidates),
            MatchMode::First | MatchMode::All => {}
        }

        let mut claimed: Vec<Range<usize>> = Vec::new();
        for caps in &candidates {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if rule.placement == Placement::Tail
                && self.tail_floor.is_some_and(|floor| whole.start() < floor)
            {
                continue;
            }

            let had_season = self.info.season.is_some();
            if !(rule.extract)(caps, &mut self.info) {
                continue;
            }
            if !had_season && self.info.season.is_some() {
                self.season_marker = Some(whole.start());
            }
            if rule.placement == Placement::Anchor {
                self.title_end = Some(
                    self.title_end
                        .map_or(whole.start(), |end| end.min(whole.start())),
                );
            }

            claimed.push(caps.name("token").unwrap_or(whole).range());
            if rule.mode != MatchMode::All {
                break;
            }
        }

        for range in claimed {
            let blank = " ".repeat(range.len());
            self.working.replace_range(range, &blank);
        }
    }

    /// Nearest year before the season marker wins; without one the last
    /// year wins. A year opening the title is part of the title.
    fn order_year_candidates(&self, candidates: &mut Vec<Captures<'_>>) {
        let start = |caps: &Captures<'_>| caps.get(0).map_or(0, |m| m.start());
        candidates.retain(|caps| start(caps) > 0);

        match self.season_marker {
            Some(marker) => candidates.sort_by_key(|caps| {
                let pos = start(caps);
                if pos < marker {
                    (0, marker - pos)
                } else {
                    (1, pos - marker)
                }
            }),
            None => candidates.reverse(),
        }
    }

    fn finish(mut self) -> ParsedInfo {
        let end = floor_char_boundary(self.cleaned, self.title_end.unwrap_or(self.cleaned.len()));
        let title = display_title(&self.cleaned[..end]);

        if self.info.sequence.is_none() {
            self.info.sequence = trailing_sequence(&title);
        }

        self.info.quality.quality =
            Quality::from_parts(self.info.source, self.info.resolution, self.info.modifier);
        self.info.is_fully_parsed = !title.is_empty()
            && (self.info.source != Source::Unknown || self.info.resolution != Resolution::Unknown);
        self.info.title = title;
        self.info
    }
}

/// "Rocky IV", "Toy Story 3".
fn trailing_sequence(title: &str) -> Option<u32> {
    let (_, last) = title.rsplit_once(' ')?;
    if last.len() >= 2 && last.chars().all(|c| "IVXLCDM".contains(c)) {
        from_roman(last)
    } else if last.len() <= 2 && last.chars().all(|c| c.is_ascii_digit()) {
        last.parse().ok()
    } else {
        None
    }
}

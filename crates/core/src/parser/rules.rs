//! The ordered rule table driving the title parser.
//!
//! Each rule pairs a pattern with an extractor. Rules run in table order and
//! every accepted match is blanked out of the working title, so a token can
//! only ever be claimed by one category.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::roman::from_roman;
use super::types::{Language, Modifier, ParsedInfo, Resolution, Source, VideoCodec};

/// Token category, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Revision,
    Resolution,
    Source,
    Codec,
    Language,
    Edition,
    ReleaseGroup,
    Numbering,
}

/// Which matches of a pattern a rule considers, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Leftmost accepted match.
    First,
    /// Rightmost accepted match.
    Last,
    /// Every accepted match.
    All,
    /// Year selection: nearest before a season marker, otherwise the last
    /// candidate that is not the very start of the title.
    Year,
}

/// Where in the title a rule may match and whether it ends the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Release token that marks the end of the title.
    Anchor,
    /// Only valid at or after the first anchor.
    Tail,
    /// Anywhere; does not end the title.
    Anywhere,
}

/// Returns `false` to decline a match (it is then neither recorded nor
/// blanked).
pub type Extractor = fn(&Captures<'_>, &mut ParsedInfo) -> bool;

pub struct Rule {
    pub name: &'static str,
    pub category: RuleCategory,
    pub placement: Placement,
    pub mode: MatchMode,
    pub pattern: Regex,
    pub extract: Extractor,
}

impl Rule {
    fn new(
        name: &'static str,
        category: RuleCategory,
        placement: Placement,
        mode: MatchMode,
        pattern: &str,
        extract: Extractor,
    ) -> Self {
        Self {
            name,
            category,
            placement,
            mode,
            // Patterns are compile-time constants covered by the tests below.
            pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("rule {}: {}", name, e)),
            extract,
        }
    }

    /// Position of the first (or last, for `Last` rules) match in `text`.
    pub(crate) fn probe(&self, text: &str) -> Option<usize> {
        match self.mode {
            MatchMode::Last => self.pattern.find_iter(text).last().map(|m| m.start()),
            MatchMode::Year => self.pattern.find_iter(text).map(|m| m.start()).find(|s| *s > 0),
            _ => self.pattern.find(text).map(|m| m.start()),
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

fn group<'t>(caps: &'t Captures<'_>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str())
}

fn extract_proper(_: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    info.quality.revision.version = info.quality.revision.version.max(2);
    true
}

fn extract_repack(_: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    info.quality.revision.version = info.quality.revision.version.max(2);
    info.quality.revision.is_repack = true;
    true
}

fn extract_version(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    let Some(version) = group(caps, "version")
        .or_else(|| group(caps, "bversion"))
        .and_then(|v| v.parse::<u8>().ok())
    else {
        return false;
    };
    info.quality.revision.version = info.quality.revision.version.max(version);
    true
}

fn extract_real(_: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    info.quality.revision.real = info.quality.revision.real.saturating_add(1);
    true
}

fn extract_resolution(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    info.resolution = if caps.name("r2160").is_some() {
        Resolution::R2160p
    } else if caps.name("r1080").is_some() {
        Resolution::R1080p
    } else if caps.name("r720").is_some() {
        Resolution::R720p
    } else if caps.name("r576").is_some() {
        Resolution::R576p
    } else if caps.name("r480").is_some() {
        Resolution::R480p
    } else {
        return false;
    };
    true
}

fn extract_modifier(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    info.modifier = if caps.name("remux").is_some() {
        Modifier::Remux
    } else {
        Modifier::BrDisk
    };
    if info.source == Source::Unknown {
        info.source = Source::Bluray;
    }
    true
}

fn extract_source(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    const NAMES: [(&str, Source); 17] = [
        ("bluray", Source::Bluray),
        ("webdl", Source::WebDl),
        ("webrip", Source::WebRip),
        ("web", Source::WebDl),
        ("hdtv", Source::Hdtv),
        ("bdrip", Source::Bluray),
        ("dvdr", Source::Dvdr),
        ("dvd", Source::Dvd),
        ("sdtv", Source::Sdtv),
        ("scr", Source::Screener),
        ("ts", Source::Telesync),
        ("tc", Source::Telecine),
        ("cam", Source::Cam),
        ("wp", Source::Workprint),
        ("regional", Source::Regional),
        ("lossless", Source::Flac),
        ("lossy", Source::Mp3),
    ];

    let Some(source) = NAMES
        .iter()
        .find(|(name, _)| caps.name(name).is_some())
        .map(|(_, source)| *source)
    else {
        return false;
    };

    info.source = match (source, group(caps, "lossless"), group(caps, "lossy")) {
        (Source::Flac, Some(token), _) if token.eq_ignore_ascii_case("alac") => Source::Alac,
        (Source::Mp3, _, Some(token)) if token.eq_ignore_ascii_case("aac") => Source::Aac,
        (source, _, _) => source,
    };
    true
}

fn extract_codec(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    info.codec = if caps.name("h264").is_some() {
        Some(VideoCodec::H264)
    } else if caps.name("h265").is_some() {
        Some(VideoCodec::H265)
    } else if caps.name("xvid").is_some() {
        Some(VideoCodec::Xvid)
    } else if caps.name("divx").is_some() {
        Some(VideoCodec::Divx)
    } else if caps.name("av1").is_some() {
        Some(VideoCodec::Av1)
    } else {
        return false;
    };
    true
}

fn extract_language(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    let Some(token) = group(caps, "lang") else {
        return false;
    };
    let language = match token.to_ascii_lowercase().as_str() {
        "english" | "eng" => Language::English,
        "french" | "truefrench" | "vostfr" | "vff" | "vf" => Language::French,
        "german" | "deutsch" | "ger" => Language::German,
        "italian" | "ita" => Language::Italian,
        "spanish" | "esp" | "spa" | "castellano" | "latino" => Language::Spanish,
        "dutch" | "flemish" => Language::Dutch,
        "portuguese" | "por" => Language::Portuguese,
        "russian" | "rus" => Language::Russian,
        "polish" => Language::Polish,
        "swedish" | "swesub" => Language::Swedish,
        "danish" => Language::Danish,
        "norwegian" => Language::Norwegian,
        "finnish" => Language::Finnish,
        "japanese" | "jpn" => Language::Japanese,
        "korean" | "kor" => Language::Korean,
        "chinese" | "mandarin" | "cantonese" => Language::Chinese,
        "hindi" => Language::Hindi,
        "multi" | "dual" => Language::Multi,
        _ => return false,
    };
    info.languages.insert(language);
    true
}

fn extract_edition(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    let Some(token) = group(caps, "edition") else {
        return false;
    };
    let edition = token
        .split(['.', ' ', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");
    info.edition = Some(edition);
    true
}

fn extract_release_group(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    const NOT_GROUPS: [&str; 4] = ["MP3", "ALAC", "FLAC", "WEB"];

    let Some(candidate) = group(caps, "group") else {
        return false;
    };
    if candidate.chars().all(|c| c.is_ascii_digit())
        || NOT_GROUPS.iter().any(|g| g.eq_ignore_ascii_case(candidate))
    {
        return false;
    }
    info.release_group = Some(candidate.to_string());
    true
}

fn extract_season_episode(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    let season = group(caps, "season").or_else(|| group(caps, "xseason"));
    let first = group(caps, "episode").or_else(|| group(caps, "xepisode"));
    let (Some(season), Some(first)) = (
        season.and_then(|s| s.parse::<u32>().ok()),
        first.and_then(|e| e.parse::<u32>().ok()),
    ) else {
        return false;
    };

    let last = group(caps, "episode2")
        .and_then(|e| e.parse::<u32>().ok())
        .filter(|last| *last > first && last - first < 50)
        .unwrap_or(first);

    info.season = Some(season);
    info.episodes = (first..=last).collect();
    true
}

fn extract_season_pack(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    if info.season.is_some() {
        return false;
    }
    let Some(season) = group(caps, "season")
        .or_else(|| group(caps, "season2"))
        .and_then(|s| s.parse::<u32>().ok())
    else {
        return false;
    };
    info.season = Some(season);
    true
}

fn extract_sequence(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    if info.sequence.is_some() {
        return false;
    }
    let Some(token) = group(caps, "seq") else {
        return false;
    };
    let value = token.parse::<u32>().ok().or_else(|| from_roman(token));
    match value {
        Some(value) => {
            info.sequence = Some(value);
            true
        }
        None => false,
    }
}

fn extract_year(caps: &Captures<'_>, info: &mut ParsedInfo) -> bool {
    match group(caps, "year").and_then(|y| y.parse::<u16>().ok()) {
        Some(year) => {
            info.year = Some(year);
            true
        }
        None => false,
    }
}

// ============================================================================
// Table
// ============================================================================

/// The rule table, in evaluation order.
pub static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use MatchMode::*;
    use Placement::*;
    use RuleCategory as C;

    vec![
        Rule::new("proper", C::Revision, Tail, Last, r"(?i)\bproper\b", extract_proper),
        Rule::new("repack", C::Revision, Tail, Last, r"(?i)\b(?:repack|rerip)\b", extract_repack),
        Rule::new(
            "version",
            C::Revision,
            Tail,
            Last,
            r"(?i)\d(?P<token>v(?P<version>\d))\b|\[v(?P<bversion>\d)\]",
            extract_version,
        ),
        Rule::new("real", C::Revision, Tail, All, r"\bREAL\b", extract_real),
        Rule::new(
            "resolution",
            C::Resolution,
            Anchor,
            Last,
            r"(?i)\b(?:(?P<r480>480[ip]|640x480|848x480)|(?P<r576>576[ip])|(?P<r720>720[ip]|1280x720)|(?P<r1080>1080[ip]|1920x1080)|(?P<r2160>2160[ip]|3840x2160|4k|uhd))\b",
            extract_resolution,
        ),
        Rule::new(
            "modifier",
            C::Source,
            Anchor,
            Last,
            r"(?i)\b(?:(?P<remux>(?:BD)?Remux)|(?P<brdisk>COMPLETE[ .]BLURAY|BDISO|BD25|BD50|BR.?DISK))\b",
            extract_modifier,
        ),
        Rule::new(
            "source",
            C::Source,
            Anchor,
            Last,
            r"(?i)\b(?:(?P<bluray>M?Blu-?Ray|HDDVD)|(?P<webdl>WEB[-. ]?DL|iTunesHD|WebHD)|(?P<webrip>WEB-?Rip)|(?P<web>WEB)|(?P<hdtv>HDTV)|(?P<bdrip>BDRip|BRRip)|(?P<dvdr>DVD-?R|DVD5|DVD9)|(?P<dvd>DVDRip|DVD|NTSC|PAL)|(?P<sdtv>SDTV|PDTV|TVRip|DSR)|(?P<scr>DVDSCR|SCREENER|SCR)|(?P<ts>TELESYNC|HDTS|TS)|(?P<tc>TELECINE|HDTC|TC)|(?P<cam>CAMRIP|HDCAM|CAM)|(?P<wp>WORKPRINT)|(?P<regional>REGIONAL)|(?P<lossless>FLAC|ALAC)|(?P<lossy>MP3|AAC))\b",
            extract_source,
        ),
        Rule::new(
            "codec",
            C::Codec,
            Anchor,
            Last,
            r"(?i)\b(?:(?P<h264>[xh][ .]?264|AVC)|(?P<h265>[xh][ .]?265|HEVC)|(?P<xvid>X-?vid)|(?P<divx>divx)|(?P<av1>AV1))\b",
            extract_codec,
        ),
        Rule::new(
            "language",
            C::Language,
            Tail,
            All,
            r"(?i)\b(?P<lang>english|eng|truefrench|french|vostfr|vff|vf|german|deutsch|ger|italian|ita|spanish|esp|spa|castellano|latino|dutch|flemish|portuguese|por|russian|rus|polish|swedish|swesub|danish|norwegian|finnish|japanese|jpn|korean|kor|chinese|mandarin|cantonese|hindi|multi|dual)\b",
            extract_language,
        ),
        Rule::new(
            "edition",
            C::Edition,
            Tail,
            First,
            r"(?i)\b(?P<edition>(?:director'?s|collector'?s|theatrical|ultimate|extended|final|special|anniversary|criterion)[ .](?:cut|edition|version)|extended|uncut|unrated|theatrical|remastered|imax|criterion|open[ .]matte)\b",
            extract_edition,
        ),
        Rule::new(
            "release_group",
            C::ReleaseGroup,
            Tail,
            Last,
            r"(?i)-(?P<group>[a-z0-9]+)(?:\b|[-._ ])",
            extract_release_group,
        ),
        Rule::new(
            "season_episode",
            C::Numbering,
            Anchor,
            First,
            r"(?i)\bS(?P<season>\d{1,2})[ .]?E(?P<episode>\d{1,3})(?:-?E(?P<episode2>\d{1,3}))?\b|\b(?P<xseason>\d{1,2})x(?P<xepisode>\d{2,3})\b",
            extract_season_episode,
        ),
        Rule::new(
            "season_pack",
            C::Numbering,
            Anchor,
            First,
            r"(?i)\bS(?P<season>\d{1,2})\b|\bSeason[ .](?P<season2>\d{1,2})\b",
            extract_season_pack,
        ),
        Rule::new(
            "sequence",
            C::Numbering,
            Anywhere,
            First,
            r"(?i)(?:\b(?:part|pt|vol|volume|chapter|episode|ep)[ .]?|#)(?P<seq>\d{1,4}|(?-i:[IVXLCDM]{1,6}))\b",
            extract_sequence,
        ),
        Rule::new(
            "year",
            C::Numbering,
            Anchor,
            Year,
            r"\b(?P<year>(?:19|20)\d{2})\b",
            extract_year,
        ),
    ]
});

// ============================================================================
// Pre-processing patterns
// ============================================================================

pub(crate) static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(?:mkv|mp4|avi|m4v|wmv|nzb|torrent|epub|mobi|azw3|m4b|pdf)$")
        .unwrap_or_else(|e| panic!("file extension pattern: {}", e))
});

pub(crate) static WEBSITE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\[\s*[-a-z]+(?:\.[a-z]+)+\s*\][- ]*|^www\.[a-z]+\.(?:com|net|org)[ -]*")
        .unwrap_or_else(|e| panic!("website prefix pattern: {}", e))
});

pub(crate) static TORRENT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(?:ettv|rartv|rarbg|cttv|eztv)\]$")
        .unwrap_or_else(|e| panic!("torrent suffix pattern: {}", e))
});

pub(crate) static GROUP_JUNK_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:-(?:RP|1|NZBGeek|Obfuscated|Scrambled|sample|Pre|postbot|xpost|Rakuv[a-z0-9]*|WhiteRev|BUYMORE|AsRequested|AlternativeToRequested))+$",
    )
    .unwrap_or_else(|e| panic!("group suffix pattern: {}", e))
});

/// Obfuscated names indexers hand out in place of real release names.
pub(crate) static HASHED_RELEASE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^[0-9a-zA-Z]{32}$",
        r"^[a-z0-9]{24}$",
        r"^[A-Z]{11}\d{3}$",
        r"^[a-z]{12}\d{3}$",
        r"^Backup_\d{5,}S\d{2}-\d{2}$",
        r"^123$",
        r"(?i)^abc$",
        r"(?i)^b00bs$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("hashed pattern {}: {}", p, e)))
    .collect()
});

//! Release metadata types produced by the title parser.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Quality building blocks
// ============================================================================

/// Where a release was sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Unknown,
    Workprint,
    Cam,
    Telesync,
    Telecine,
    Screener,
    Regional,
    Sdtv,
    Dvd,
    Dvdr,
    Hdtv,
    WebRip,
    WebDl,
    Bluray,
    Mp3,
    Aac,
    Flac,
    Alac,
}

impl Source {
    /// Returns the canonical keyword for this source.
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Source::Unknown => "unknown",
            Source::Workprint => "WORKPRINT",
            Source::Cam => "CAM",
            Source::Telesync => "TELESYNC",
            Source::Telecine => "TELECINE",
            Source::Screener => "SCREENER",
            Source::Regional => "REGIONAL",
            Source::Sdtv => "SDTV",
            Source::Dvd => "DVD",
            Source::Dvdr => "DVD-R",
            Source::Hdtv => "HDTV",
            Source::WebRip => "WEBRip",
            Source::WebDl => "WEB-DL",
            Source::Bluray => "BluRay",
            Source::Mp3 => "MP3",
            Source::Aac => "AAC",
            Source::Flac => "FLAC",
            Source::Alac => "ALAC",
        }
    }

    /// Whether this is an audio-only source.
    pub fn is_audio(&self) -> bool {
        matches!(self, Source::Mp3 | Source::Aac | Source::Flac | Source::Alac)
    }
}

/// Vertical video resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Unknown,
    R480p,
    R576p,
    R720p,
    R1080p,
    R2160p,
}

impl Resolution {
    /// Returns the keyword used in release names.
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Resolution::Unknown => "unknown",
            Resolution::R480p => "480p",
            Resolution::R576p => "576p",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
            Resolution::R2160p => "2160p",
        }
    }
}

/// Special packaging of a disc source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    #[default]
    None,
    Remux,
    BrDisk,
}

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    H264,
    H265,
    Xvid,
    Divx,
    Av1,
}

impl VideoCodec {
    pub fn as_keyword(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "x264",
            VideoCodec::H265 => "x265",
            VideoCodec::Xvid => "XviD",
            VideoCodec::Divx => "DivX",
            VideoCodec::Av1 => "AV1",
        }
    }
}

// ============================================================================
// Named qualities
// ============================================================================

/// A named quality, the unit acceptance profiles are expressed in.
///
/// Serialized using the display names (`"Bluray-1080p"`, `"WEBDL-720p"`,
/// `"FLAC"`), which is also the format used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    #[default]
    Unknown,
    Workprint,
    Cam,
    Telesync,
    Telecine,
    Regional,
    Screener,
    Sdtv,
    Dvd,
    Dvdr,
    Webdl480p,
    Webrip480p,
    Bluray480p,
    Bluray576p,
    Hdtv720p,
    Webdl720p,
    Webrip720p,
    Bluray720p,
    Hdtv1080p,
    Webdl1080p,
    Webrip1080p,
    Bluray1080p,
    Remux1080p,
    Hdtv2160p,
    Webdl2160p,
    Webrip2160p,
    Bluray2160p,
    Remux2160p,
    BrDisk,
    Mp3,
    Aac,
    Flac,
    Alac,
}

const QUALITY_NAMES: &[(Quality, &str)] = &[
    (Quality::Unknown, "Unknown"),
    (Quality::Workprint, "WORKPRINT"),
    (Quality::Cam, "CAM"),
    (Quality::Telesync, "TELESYNC"),
    (Quality::Telecine, "TELECINE"),
    (Quality::Regional, "REGIONAL"),
    (Quality::Screener, "DVDSCR"),
    (Quality::Sdtv, "SDTV"),
    (Quality::Dvd, "DVD"),
    (Quality::Dvdr, "DVD-R"),
    (Quality::Webdl480p, "WEBDL-480p"),
    (Quality::Webrip480p, "WEBRip-480p"),
    (Quality::Bluray480p, "Bluray-480p"),
    (Quality::Bluray576p, "Bluray-576p"),
    (Quality::Hdtv720p, "HDTV-720p"),
    (Quality::Webdl720p, "WEBDL-720p"),
    (Quality::Webrip720p, "WEBRip-720p"),
    (Quality::Bluray720p, "Bluray-720p"),
    (Quality::Hdtv1080p, "HDTV-1080p"),
    (Quality::Webdl1080p, "WEBDL-1080p"),
    (Quality::Webrip1080p, "WEBRip-1080p"),
    (Quality::Bluray1080p, "Bluray-1080p"),
    (Quality::Remux1080p, "Remux-1080p"),
    (Quality::Hdtv2160p, "HDTV-2160p"),
    (Quality::Webdl2160p, "WEBDL-2160p"),
    (Quality::Webrip2160p, "WEBRip-2160p"),
    (Quality::Bluray2160p, "Bluray-2160p"),
    (Quality::Remux2160p, "Remux-2160p"),
    (Quality::BrDisk, "BR-DISK"),
    (Quality::Mp3, "MP3"),
    (Quality::Aac, "AAC"),
    (Quality::Flac, "FLAC"),
    (Quality::Alac, "ALAC"),
];

impl Quality {
    /// Every known quality, lowest to highest in the default ordering.
    pub fn all() -> impl Iterator<Item = Quality> {
        QUALITY_NAMES.iter().map(|(q, _)| *q)
    }

    pub fn name(&self) -> &'static str {
        QUALITY_NAMES
            .iter()
            .find(|(q, _)| q == self)
            .map(|(_, name)| *name)
            .unwrap_or("Unknown")
    }

    /// Combine the independently parsed source, resolution and modifier into
    /// a named quality. Missing resolutions fall back to the lowest
    /// resolution the source is commonly released at.
    pub fn from_parts(source: Source, resolution: Resolution, modifier: Modifier) -> Quality {
        use Resolution as R;

        if modifier == Modifier::BrDisk {
            return Quality::BrDisk;
        }

        match source {
            Source::Unknown => match resolution {
                R::Unknown => Quality::Unknown,
                R::R480p | R::R576p => Quality::Sdtv,
                R::R720p => Quality::Hdtv720p,
                R::R1080p => Quality::Hdtv1080p,
                R::R2160p => Quality::Hdtv2160p,
            },
            Source::Workprint => Quality::Workprint,
            Source::Cam => Quality::Cam,
            Source::Telesync => Quality::Telesync,
            Source::Telecine => Quality::Telecine,
            Source::Screener => Quality::Screener,
            Source::Regional => Quality::Regional,
            Source::Sdtv => Quality::Sdtv,
            Source::Dvd => Quality::Dvd,
            Source::Dvdr => Quality::Dvdr,
            Source::Hdtv => match resolution {
                R::Unknown | R::R480p | R::R576p => Quality::Sdtv,
                R::R720p => Quality::Hdtv720p,
                R::R1080p => Quality::Hdtv1080p,
                R::R2160p => Quality::Hdtv2160p,
            },
            Source::WebDl => match resolution {
                R::Unknown | R::R480p | R::R576p => Quality::Webdl480p,
                R::R720p => Quality::Webdl720p,
                R::R1080p => Quality::Webdl1080p,
                R::R2160p => Quality::Webdl2160p,
            },
            Source::WebRip => match resolution {
                R::Unknown | R::R480p | R::R576p => Quality::Webrip480p,
                R::R720p => Quality::Webrip720p,
                R::R1080p => Quality::Webrip1080p,
                R::R2160p => Quality::Webrip2160p,
            },
            Source::Bluray if modifier == Modifier::Remux => match resolution {
                R::R2160p => Quality::Remux2160p,
                _ => Quality::Remux1080p,
            },
            Source::Bluray => match resolution {
                R::R480p => Quality::Bluray480p,
                R::R576p => Quality::Bluray576p,
                R::Unknown | R::R720p => Quality::Bluray720p,
                R::R1080p => Quality::Bluray1080p,
                R::R2160p => Quality::Bluray2160p,
            },
            Source::Mp3 => Quality::Mp3,
            Source::Aac => Quality::Aac,
            Source::Flac => Quality::Flac,
            Source::Alac => Quality::Alac,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QUALITY_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(q, _)| *q)
            .ok_or_else(|| format!("unknown quality: {}", s))
    }
}

impl Serialize for Quality {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Proper/repack/version information. A higher revision of the same quality
/// is an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub version: u8,
    pub real: u8,
    #[serde(default)]
    pub is_repack: bool,
}

impl Default for Revision {
    fn default() -> Self {
        Self {
            version: 1,
            real: 0,
            is_repack: false,
        }
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.real
            .cmp(&other.real)
            .then(self.version.cmp(&other.version))
    }
}

/// Quality plus revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityModel {
    pub quality: Quality,
    #[serde(default)]
    pub revision: Revision,
}

impl QualityModel {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            revision: Revision::default(),
        }
    }
}

// ============================================================================
// Languages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    French,
    German,
    Italian,
    Spanish,
    Dutch,
    Portuguese,
    Russian,
    Polish,
    Swedish,
    Danish,
    Norwegian,
    Finnish,
    Japanese,
    Korean,
    Chinese,
    Hindi,
    /// Release carries several audio languages.
    Multi,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Language::English,
            "french" | "fr" => Language::French,
            "german" | "de" => Language::German,
            "italian" | "it" => Language::Italian,
            "spanish" | "es" => Language::Spanish,
            "dutch" | "nl" => Language::Dutch,
            "portuguese" | "pt" => Language::Portuguese,
            "russian" | "ru" => Language::Russian,
            "polish" | "pl" => Language::Polish,
            "swedish" | "sv" => Language::Swedish,
            "danish" | "da" => Language::Danish,
            "norwegian" | "no" => Language::Norwegian,
            "finnish" | "fi" => Language::Finnish,
            "japanese" | "ja" => Language::Japanese,
            "korean" | "ko" => Language::Korean,
            "chinese" | "zh" => Language::Chinese,
            "hindi" | "hi" => Language::Hindi,
            "multi" => Language::Multi,
            other => return Err(format!("unknown language: {}", other)),
        };
        Ok(lang)
    }
}

// ============================================================================
// Parse result
// ============================================================================

/// Structured metadata extracted from a release title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParsedInfo {
    /// Title with release tokens stripped and separators normalized.
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<u32>,
    /// Sequence index ("Part II", "Vol 3", absolute numbering).
    pub sequence: Option<u32>,
    pub source: Source,
    pub resolution: Resolution,
    pub modifier: Modifier,
    pub quality: QualityModel,
    pub codec: Option<VideoCodec>,
    #[serde(default)]
    pub languages: BTreeSet<Language>,
    pub edition: Option<String>,
    pub release_group: Option<String>,
    /// Title looks like an obfuscated hash rather than a release name.
    #[serde(default)]
    pub is_hashed: bool,
    pub is_fully_parsed: bool,
}

impl ParsedInfo {
    /// Minimal result for input nothing could be extracted from.
    pub fn unparsed(raw: &str) -> Self {
        Self {
            title: raw.trim().to_string(),
            ..Default::default()
        }
    }

    /// Title in the form used for identity comparisons.
    pub fn normalized_title(&self) -> String {
        super::normalize_title(&self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_names_round_trip_through_from_str() {
        for quality in Quality::all() {
            assert_eq!(quality.name().parse::<Quality>().unwrap(), quality);
        }
    }

    #[test]
    fn test_quality_from_parts_defaults_missing_resolution() {
        assert_eq!(
            Quality::from_parts(Source::Bluray, Resolution::Unknown, Modifier::None),
            Quality::Bluray720p
        );
        assert_eq!(
            Quality::from_parts(Source::WebDl, Resolution::Unknown, Modifier::None),
            Quality::Webdl480p
        );
        assert_eq!(
            Quality::from_parts(Source::Unknown, Resolution::R1080p, Modifier::None),
            Quality::Hdtv1080p
        );
        assert_eq!(
            Quality::from_parts(Source::Bluray, Resolution::R2160p, Modifier::Remux),
            Quality::Remux2160p
        );
        assert_eq!(
            Quality::from_parts(Source::Bluray, Resolution::R1080p, Modifier::BrDisk),
            Quality::BrDisk
        );
    }

    #[test]
    fn test_quality_serde_uses_display_name() {
        let json = serde_json::to_string(&Quality::Webdl1080p).unwrap();
        assert_eq!(json, "\"WEBDL-1080p\"");
        let parsed: Quality = serde_json::from_str("\"bluray-2160p\"").unwrap();
        assert_eq!(parsed, Quality::Bluray2160p);
        assert!(serde_json::from_str::<Quality>("\"VHS\"").is_err());
    }

    #[test]
    fn test_revision_ordering() {
        let v1 = Revision::default();
        let v2 = Revision {
            version: 2,
            ..Default::default()
        };
        let real = Revision {
            real: 1,
            ..Default::default()
        };
        assert!(v2 > v1);
        assert!(real > v2);
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("French".parse::<Language>().unwrap(), Language::French);
        assert_eq!("de".parse::<Language>().unwrap(), Language::German);
        assert!("klingon".parse::<Language>().is_err());
    }
}

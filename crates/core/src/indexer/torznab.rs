//! Torznab / Newznab sources.
//!
//! Both APIs share the same URL scheme and RSS response format; they differ
//! only in the protocol of the releases they return.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use super::source::Source;
use super::types::{
    ChainPolicy, IndexerError, IndexerFlags, PageRequest, Protocol, ReleaseInfo, RequestChain,
    SearchCriteria, SourceDefinition, Tier,
};
use crate::parser::clean_search_terms;

/// A Torznab (torrent) or Newznab (usenet) source.
pub struct NewznabFamilySource {
    definition: SourceDefinition,
}

impl NewznabFamilySource {
    pub fn new(definition: SourceDefinition) -> Self {
        Self { definition }
    }

    /// Build the API URL. Parameters with empty values are skipped.
    fn api_url(&self, function: &str, params: &[(&str, String)]) -> String {
        let def = &self.definition;
        let mut url = format!(
            "{}{}?t={}&apikey={}",
            def.base_url.trim_end_matches('/'),
            def.api_path,
            function,
            urlencoding::encode(&def.api_key)
        );
        for (key, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }

    /// One tier of `max_pages` sequential pages.
    fn paged_tier(&self, function: &str, categories: &[u32], query: &[(&str, String)]) -> Tier {
        let caps = &self.definition.capabilities;
        let cat = join_categories(categories);

        let pages = (0..caps.max_pages.max(1))
            .map(|page| {
                let offset = page * caps.page_size;
                let mut params = vec![
                    ("cat", cat.clone()),
                    ("offset", offset.to_string()),
                    ("limit", caps.page_size.to_string()),
                ];
                params.extend(query.iter().cloned());
                PageRequest {
                    url: self.api_url(function, &params),
                    offset,
                    limit: caps.page_size,
                }
            })
            .collect();

        Tier { pages }
    }

    fn effective_categories<'a>(&'a self, criteria: &'a SearchCriteria) -> &'a [u32] {
        if criteria.categories.is_empty() {
            &self.definition.categories
        } else {
            &criteria.categories
        }
    }
}

impl Source for NewznabFamilySource {
    fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    fn build_recent_chain(&self) -> RequestChain {
        let caps = &self.definition.capabilities;
        let url = self.api_url(
            "search",
            &[
                ("cat", join_categories(&self.definition.categories)),
                ("offset", "0".to_string()),
                ("limit", caps.page_size.to_string()),
            ],
        );

        let mut chain = RequestChain::new(ChainPolicy::Recent);
        chain.push_tier(Tier {
            pages: vec![PageRequest {
                url,
                offset: 0,
                limit: caps.page_size,
            }],
        });
        chain
    }

    fn build_search_chain(&self, criteria: &SearchCriteria) -> RequestChain {
        let caps = &self.definition.capabilities;
        let categories = self.effective_categories(criteria);
        let is_episode = criteria.season.is_some() || criteria.episode.is_some();

        let mut episode_params = Vec::new();
        if let Some(season) = criteria.season {
            episode_params.push(("season", season.to_string()));
        }
        if let Some(episode) = criteria.episode {
            episode_params.push(("ep", episode.to_string()));
        }

        let mut chain = RequestChain::new(ChainPolicy::FirstNonEmpty);

        // Tier 0: external id.
        if caps.supports_id_search {
            if let Some((param, value, tv_id)) = criteria.external_id_parts().and_then(id_param) {
                let function = if is_episode || tv_id { "tvsearch" } else { "movie" };
                let mut query = vec![(param, value)];
                query.extend(episode_params.iter().cloned());
                chain.push_tier(self.paged_tier(function, categories, &query));
            }
        }

        // Tier 1: title.
        let terms = clean_search_terms(&criteria.terms);
        if caps.supports_title_search && !terms.is_empty() {
            let function = if is_episode { "tvsearch" } else { "search" };
            let mut query = vec![("q", terms)];
            query.extend(episode_params.iter().cloned());
            chain.push_tier(self.paged_tier(function, categories, &query));
        }

        // Tier 2: category browse.
        if !categories.is_empty() {
            chain.push_tier(self.paged_tier("search", categories, &[]));
        }

        chain
    }

    fn parse_response(&self, body: &str) -> Result<Vec<ReleaseInfo>, IndexerError> {
        parse_feed(body, &self.definition.name, self.definition.protocol())
    }
}

fn join_categories(categories: &[u32]) -> String {
    categories
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Map an external id scheme to its query parameter. The flag marks ids
/// that only make sense for TV searches.
fn id_param((scheme, value): (&str, &str)) -> Option<(&'static str, String, bool)> {
    match scheme.to_ascii_lowercase().as_str() {
        "imdb" => Some(("imdbid", value.trim_start_matches("tt").to_string(), false)),
        "tmdb" => Some(("tmdbid", value.to_string(), false)),
        "tvdb" => Some(("tvdbid", value.to_string(), true)),
        "tvmaze" => Some(("tvmazeid", value.to_string(), true)),
        _ => None,
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Map a `<error code=".." description=".."/>` element to an error.
fn api_error(code: i32, description: String) -> IndexerError {
    if (100..=199).contains(&code) {
        IndexerError::ApiKey(description)
    } else if description == "Request limit reached" {
        IndexerError::RequestLimit
    } else {
        IndexerError::Api {
            code,
            message: description,
        }
    }
}

fn attributes(element: &BytesStart<'_>) -> Vec<(String, String)> {
    element
        .attributes()
        .flatten()
        .map(|attr| {
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            (String::from_utf8_lossy(attr.key.as_ref()).to_string(), value)
        })
        .collect()
}

/// Parse an RSS feed with `newznab:attr` / `torznab:attr` extensions.
pub fn parse_feed(
    xml: &str,
    source_name: &str,
    protocol: Protocol,
) -> Result<Vec<ReleaseInfo>, IndexerError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut releases = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut current_tag = String::new();
    let mut seen_feed = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| IndexerError::Parse(format!("XML error at {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "error" => {
                        let attrs = attributes(e);
                        let code = attrs
                            .iter()
                            .find(|(k, _)| k == "code")
                            .and_then(|(_, v)| v.parse().ok())
                            .unwrap_or(0);
                        let description = attrs
                            .into_iter()
                            .find(|(k, _)| k == "description")
                            .map(|(_, v)| v)
                            .unwrap_or_default();
                        warn!(source = source_name, code = code, error = %description, "Source reported API error");
                        return Err(api_error(code, description));
                    }
                    "rss" | "channel" => seen_feed = true,
                    "item" => current = Some(ItemBuilder::default()),
                    "newznab:attr" | "torznab:attr" => {
                        if let Some(item) = current.as_mut() {
                            let attrs = attributes(e);
                            let name = attrs.iter().find(|(k, _)| k == "name").map(|(_, v)| v.as_str());
                            let value = attrs.iter().find(|(k, _)| k == "value").map(|(_, v)| v.as_str());
                            if let (Some(name), Some(value)) = (name, value) {
                                item.set_attr(name, value);
                            }
                        }
                    }
                    "enclosure" => {
                        if let Some(item) = current.as_mut() {
                            for (key, value) in attributes(e) {
                                match key.as_str() {
                                    "url" => item.enclosure_url = Some(value),
                                    "length" => item.enclosure_length = value.parse().ok(),
                                    _ => {}
                                }
                            }
                        }
                    }
                    _ => {}
                }
                if matches!(event, Event::Start(_)) {
                    current_tag = tag;
                }
            }
            Event::Text(ref e) => {
                if let Some(item) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| IndexerError::Parse(err.to_string()))?
                        .to_string();
                    item.set_text(&current_tag, text);
                }
            }
            Event::CData(e) => {
                if let Some(item) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    item.set_text(&current_tag, text);
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        if let Some(release) = item.build(source_name, protocol) {
                            releases.push(release);
                        }
                    }
                }
                current_tag.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_feed {
        let preview: String = xml.trim().chars().take(80).collect();
        warn!(source = source_name, body = %preview, "Response is not an RSS feed");
        return Err(IndexerError::Parse(format!(
            "response is not an RSS feed: {:?}",
            preview
        )));
    }

    Ok(releases)
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: Option<String>,
    guid: Option<String>,
    link: Option<String>,
    enclosure_url: Option<String>,
    enclosure_length: Option<u64>,
    size_tag: Option<u64>,
    size_attr: Option<u64>,
    pub_date: Option<DateTime<Utc>>,
    seeders: Option<u32>,
    peers: Option<u32>,
    info_hash: Option<String>,
    magnet: Option<String>,
    imdb: Option<String>,
    tvdb: Option<String>,
    categories: Vec<u32>,
    download_factor: Option<f64>,
    upload_factor: Option<f64>,
    tags: Vec<String>,
}

impl ItemBuilder {
    fn set_text(&mut self, tag: &str, text: String) {
        if text.is_empty() {
            return;
        }
        match tag {
            "title" => self.title = Some(text),
            "guid" => self.guid = Some(text),
            "link" => self.link = Some(text),
            "size" => self.size_tag = text.parse().ok(),
            "pubDate" => {
                self.pub_date = DateTime::parse_from_rfc2822(&text)
                    .ok()
                    .map(|d| d.with_timezone(&Utc))
            }
            _ => {}
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match name {
            "size" => self.size_attr = value.parse().ok(),
            "seeders" => self.seeders = value.parse().ok(),
            "peers" => self.peers = value.parse().ok(),
            "infohash" => self.info_hash = Some(value.to_lowercase()),
            "magneturl" => self.magnet = Some(value.to_string()),
            "imdb" | "imdbid" => self.imdb = Some(value.to_string()),
            "tvdbid" => self.tvdb = Some(value.to_string()),
            "category" => self.categories.extend(value.parse::<u32>().ok()),
            "downloadvolumefactor" => self.download_factor = value.parse().ok(),
            "uploadvolumefactor" => self.upload_factor = value.parse().ok(),
            "tag" => self.tags.push(value.to_lowercase()),
            _ => {}
        }
    }

    fn build(self, source_name: &str, protocol: Protocol) -> Option<ReleaseInfo> {
        let Some(title) = self.title else {
            debug!(source = source_name, "Skipping item without title");
            return None;
        };
        let Some(locator) = self
            .enclosure_url
            .or(self.link)
            .or_else(|| self.magnet.clone())
        else {
            debug!(source = source_name, title = %title, "Skipping item without download link");
            return None;
        };

        let factor_is = |factor: Option<f64>, expected: f64| {
            factor.is_some_and(|f| (f - expected).abs() < f64::EPSILON)
        };

        let mut release = ReleaseInfo::new(title, locator, source_name, protocol);
        if let Some(guid) = self.guid {
            release.guid = guid;
        }
        release.size = self
            .size_attr
            .or(self.enclosure_length)
            .or(self.size_tag)
            .unwrap_or(0);
        release.publish_date = self.pub_date;
        release.info_hash = self
            .info_hash
            .or_else(|| self.magnet.as_deref().and_then(magnet_info_hash));
        if protocol == Protocol::Torrent {
            release.seeders = self.seeders;
            release.peers = self.peers;
        }
        release.indexer_flags = IndexerFlags {
            freeleech: factor_is(self.download_factor, 0.0),
            halfleech: factor_is(self.download_factor, 0.5),
            double_upload: factor_is(self.upload_factor, 2.0),
            internal: self.tags.iter().any(|t| t == "internal"),
            scene: self.tags.iter().any(|t| t == "scene"),
        };
        release.categories = self.categories;
        if let Some(imdb) = self.imdb.filter(|id| !id.is_empty() && id != "0") {
            let digits = imdb.trim_start_matches("tt");
            release.external_ids.push(format!("imdb:tt{:0>7}", digits));
        }
        if let Some(tvdb) = self.tvdb.filter(|id| !id.is_empty() && id != "0") {
            release.external_ids.push(format!("tvdb:{}", tvdb));
        }
        Some(release)
    }
}

fn magnet_info_hash(magnet: &str) -> Option<String> {
    let start = magnet.find("urn:btih:")? + "urn:btih:".len();
    let hash: String = magnet[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!hash.is_empty()).then(|| hash.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::types::{SourceCapabilities, SourceKind};

    fn definition(kind: SourceKind, supports_id_search: bool) -> SourceDefinition {
        SourceDefinition {
            id: "s1".to_string(),
            name: "Test Source".to_string(),
            kind,
            base_url: "https://indexer.example/".to_string(),
            api_path: "/api".to_string(),
            api_key: "secret".to_string(),
            categories: vec![2000, 2040],
            capabilities: SourceCapabilities {
                supports_id_search,
                supports_title_search: true,
                page_size: 50,
                max_pages: 2,
            },
            enabled: true,
            priority: 25,
            requests_per_minute: 60,
        }
    }

    const TORZNAB_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <item>
      <title>Movie.Name.2020.1080p.BluRay.x264-GROUP</title>
      <guid>https://indexer.example/details/1</guid>
      <link>https://indexer.example/download/1.torrent</link>
      <pubDate>Tue, 14 Jan 2025 10:00:00 +0000</pubDate>
      <enclosure url="https://indexer.example/download/1.torrent" length="8589934592" type="application/x-bittorrent"/>
      <torznab:attr name="seeders" value="42"/>
      <torznab:attr name="peers" value="50"/>
      <torznab:attr name="category" value="2040"/>
      <torznab:attr name="imdb" value="111161"/>
      <torznab:attr name="infohash" value="ABCDEF0123456789ABCDEF0123456789ABCDEF01"/>
      <torznab:attr name="downloadvolumefactor" value="0"/>
      <torznab:attr name="uploadvolumefactor" value="2"/>
      <torznab:attr name="tag" value="internal"/>
    </item>
    <item>
      <title><![CDATA[No Link Release]]></title>
    </item>
    <item>
      <title>Other &amp; Movie 2019 720p WEB-DL</title>
      <torznab:attr name="magneturl" value="magnet:?xt=urn:btih:FFEE00&amp;dn=x"/>
      <torznab:attr name="size" value="1000"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_torznab_feed() {
        let releases = parse_feed(TORZNAB_FEED, "Test Source", Protocol::Torrent).unwrap();
        assert_eq!(releases.len(), 2);

        let first = &releases[0];
        assert_eq!(first.title, "Movie.Name.2020.1080p.BluRay.x264-GROUP");
        assert_eq!(first.guid, "https://indexer.example/details/1");
        assert_eq!(first.size, 8_589_934_592);
        assert_eq!(first.seeders, Some(42));
        assert_eq!(first.peers, Some(50));
        assert_eq!(first.categories, vec![2040]);
        assert_eq!(first.external_ids, vec!["imdb:tt0111161".to_string()]);
        assert_eq!(
            first.info_hash.as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef01")
        );
        assert!(first.indexer_flags.freeleech);
        assert!(first.indexer_flags.double_upload);
        assert!(first.indexer_flags.internal);
        assert!(first.publish_date.is_some());

        let second = &releases[1];
        assert_eq!(second.title, "Other & Movie 2019 720p WEB-DL");
        assert!(second.download_url.starts_with("magnet:"));
        assert_eq!(second.info_hash.as_deref(), Some("ffee00"));
        assert_eq!(second.size, 1000);
    }

    #[test]
    fn test_usenet_items_have_no_seeders() {
        let xml = r#"<rss><channel><item>
            <title>Show.S01E01.720p.HDTV</title>
            <link>https://nzb.example/get/1</link>
            <newznab:attr name="seeders" value="10"/>
        </item></channel></rss>"#;
        let releases = parse_feed(xml, "nzb", Protocol::Usenet).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].seeders, None);
        assert_eq!(releases[0].protocol, Protocol::Usenet);
    }

    #[test]
    fn test_error_codes() {
        let key = r#"<?xml version="1.0"?><error code="100" description="Incorrect user credentials"/>"#;
        assert!(matches!(
            parse_feed(key, "s", Protocol::Usenet),
            Err(IndexerError::ApiKey(_))
        ));

        let limit = r#"<error code="500" description="Request limit reached"/>"#;
        assert_eq!(
            parse_feed(limit, "s", Protocol::Usenet).unwrap_err(),
            IndexerError::RequestLimit
        );

        let other = r#"<error code="201" description="Incorrect parameter"/>"#;
        assert_eq!(
            parse_feed(other, "s", Protocol::Usenet).unwrap_err(),
            IndexerError::Api {
                code: 201,
                message: "Incorrect parameter".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let result = parse_feed("<rss><channel><item></rss>", "s", Protocol::Torrent);
        assert!(matches!(result, Err(IndexerError::Parse(_))));
    }

    #[test]
    fn test_non_feed_bodies_are_parse_errors() {
        for body in [
            "Service Unavailable",
            "<html><body><h1>502 Bad Gateway</h1></body></html>",
            "",
            "   ",
        ] {
            let result = parse_feed(body, "s", Protocol::Torrent);
            assert!(
                matches!(result, Err(IndexerError::Parse(_))),
                "body {:?} gave {:?}",
                body,
                result
            );
        }
    }

    #[test]
    fn test_empty_channel_is_empty_result() {
        let result = parse_feed(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title></channel></rss>"#,
            "s",
            Protocol::Usenet,
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_search_chain_with_id_support() {
        let source = NewznabFamilySource::new(definition(SourceKind::Torznab, true));
        let mut criteria = SearchCriteria::new("movie-1", "The Movie: Part 2");
        criteria.external_id = Some("imdb:tt0111161".to_string());

        let chain = source.build_search_chain(&criteria);
        assert_eq!(chain.policy, ChainPolicy::FirstNonEmpty);
        assert_eq!(chain.tiers.len(), 3);

        let id_page = &chain.tiers[0].pages[0];
        assert!(id_page.url.starts_with("https://indexer.example/api?t=movie&apikey=secret"));
        assert!(id_page.url.contains("imdbid=0111161"));
        assert!(id_page.url.contains("cat=2000%2C2040"));

        let title_page = &chain.tiers[1].pages[0];
        assert!(title_page.url.contains("t=search"));
        assert!(title_page.url.contains("q=the%20movie%20part%202"));

        let pages = &chain.tiers[2].pages;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].offset, 50);
        assert!(pages[1].url.contains("offset=50&limit=50"));
        assert!(!pages[1].url.contains("q="));
    }

    #[test]
    fn test_search_chain_omits_unsupported_tiers() {
        let source = NewznabFamilySource::new(definition(SourceKind::Newznab, false));
        let mut criteria = SearchCriteria::new("show-1", "Show");
        criteria.external_id = Some("tvdb:81189".to_string());
        criteria.season = Some(2);
        criteria.episode = Some(5);

        let chain = source.build_search_chain(&criteria);
        assert_eq!(chain.tiers.len(), 2);
        let url = &chain.tiers[0].pages[0].url;
        assert!(url.contains("t=tvsearch"));
        assert!(url.contains("season=2"));
        assert!(url.contains("ep=5"));
    }

    #[test]
    fn test_recent_chain_is_single_page() {
        let source = NewznabFamilySource::new(definition(SourceKind::Newznab, false));
        let chain = source.build_recent_chain();
        assert_eq!(chain.policy, ChainPolicy::Recent);
        assert_eq!(chain.tiers.len(), 1);
        assert_eq!(chain.tiers[0].pages.len(), 1);
        assert_eq!(source.definition().protocol(), Protocol::Usenet);
    }
}
